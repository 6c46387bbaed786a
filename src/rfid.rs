//! Sector level access to MIFARE Classic cards.
//!
//! A sector is addressed by its trailer block `t` (every 4th block, `t % 4 == 3`). The trailer holds
//! the keys and access bits; text lives in the three data blocks `t-3`, `t-2` and `t-1`.
//!
//! Every `*_no_block` operation makes a single attempt: discovery, select, authentication, the block
//! I/O, and crypto1 stopped again on the way out. The blocking variants repeat that attempt under the
//! reader's [`Retry`] policy until a card cooperates.

use tracing::debug;

use crate::com::Com;
use crate::config::{MifareKey, DEFAULT_KEY};
use crate::mfrc522::Mfrc522;
use crate::picc::{Command, Uid, BLOCK_SIZE};
use crate::retry::Retry;
use crate::util::{bytes_to_text, pack_text, split_text, SECTOR_DATA_SIZE};
use crate::{Error, Result};

pub fn is_valid_trailer(block: u8) -> bool {
    block % 4 == 3
}

/// A validated sector trailer block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer(u8);

impl Trailer {
    pub fn new(block: u8) -> Result<Self> {
        if !is_valid_trailer(block) {
            return Err(Error::InvalidTrailer(block));
        }
        Ok(Trailer(block))
    }

    pub fn block(self) -> u8 {
        self.0
    }

    pub fn data_blocks(self) -> [u8; 3] {
        [self.0 - 3, self.0 - 2, self.0 - 1]
    }
}

impl TryFrom<u8> for Trailer {
    type Error = Error;

    fn try_from(block: u8) -> Result<Self> {
        Trailer::new(block)
    }
}

fn validate_all(trailers: &[u8]) -> Result<()> {
    if trailers.is_empty() {
        return Err(Error::Invalid);
    }
    for &t in trailers {
        Trailer::new(t)?;
    }
    Ok(())
}

pub struct Rfid<C: Com> {
    mfrc: Mfrc522<C>,
    key: MifareKey,
    auth_mode: Command,
    retry: Retry,
}

impl<C: Com> Rfid<C> {
    /// Reader authenticating with key A and the factory key, retrying forever.
    pub fn new(mfrc: Mfrc522<C>) -> Self {
        Self {
            mfrc,
            key: DEFAULT_KEY,
            auth_mode: Command::MfAuthKeyA,
            retry: Retry::forever(),
        }
    }

    pub fn with_key(mut self, key: MifareKey) -> Self {
        self.key = key;
        self
    }

    /// `mode` is [`Command::MfAuthKeyA`] or [`Command::MfAuthKeyB`].
    pub fn with_auth_mode(mut self, mode: Command) -> Result<Self> {
        if !matches!(mode, Command::MfAuthKeyA | Command::MfAuthKeyB) {
            return Err(Error::Invalid);
        }
        self.auth_mode = mode;
        Ok(self)
    }

    pub fn with_retry(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    /// The chip, for raw protocol access.
    pub fn mfrc522(&mut self) -> &mut Mfrc522<C> {
        &mut self.mfrc
    }

    pub fn into_inner(self) -> Mfrc522<C> {
        self.mfrc
    }

    fn discover(&mut self) -> Result<Uid> {
        self.mfrc.request(Command::REQA)?;
        self.mfrc.anticollision()
    }

    /// One authenticated attempt on a sector. `op` gets the three data block addresses.
    fn with_sector<T>(
        &mut self,
        trailer: Trailer,
        op: impl FnOnce(&mut Mfrc522<C>, [u8; 3]) -> Result<T>,
    ) -> Result<(u64, T)> {
        let uid = self.discover()?;
        self.mfrc.select_tag(&uid)?;

        let (mode, key) = (self.auth_mode, self.key);
        let mut session = self.mfrc.session();
        session.authenticate(mode, trailer.block(), &key, &uid)?;
        let value = op(&mut *session, trailer.data_blocks())?;
        Ok((uid.to_num(), value))
    }

    pub fn read_id_no_block(&mut self) -> Result<u64> {
        Ok(self.discover()?.to_num())
    }

    /// Blocks until a card answers discovery.
    pub fn read_id(&mut self) -> Result<u64> {
        let retry = self.retry.clone();
        retry.run(|| self.read_id_no_block())
    }

    pub fn read_sector_no_block(&mut self, trailer: u8) -> Result<(u64, String)> {
        let trailer = Trailer::new(trailer)?;
        let (id, text) = self.with_sector(trailer, |mfrc, blocks| {
            let mut data = Vec::with_capacity(SECTOR_DATA_SIZE);
            for block in blocks {
                data.extend_from_slice(&mfrc.read_block(block)?);
            }
            Ok(bytes_to_text(&data))
        })?;
        debug!(trailer = trailer.block(), id, "sector read");
        Ok((id, text))
    }

    pub fn read_sector(&mut self, trailer: u8) -> Result<(u64, String)> {
        Trailer::new(trailer)?;
        let retry = self.retry.clone();
        retry.run(|| self.read_sector_no_block(trailer))
    }

    /// Reads the sectors in order and concatenates their text. The id is the one of the last read.
    pub fn read_sectors(&mut self, trailers: &[u8]) -> Result<(u64, String)> {
        validate_all(trailers)?;
        let mut id = 0;
        let mut text_all = String::with_capacity(trailers.len() * SECTOR_DATA_SIZE);
        for &trailer in trailers {
            let (i, text) = self.read_sector(trailer)?;
            id = i;
            text_all.push_str(&text);
        }
        Ok((id, text_all))
    }

    /// Writes `text` NUL padded, or truncated, to 48 bytes. Returns the text that fit.
    pub fn write_sector_no_block(&mut self, text: &str, trailer: u8) -> Result<(u64, String)> {
        let trailer = Trailer::new(trailer)?;
        let data = pack_text(text)?;
        let (id, ()) = self.with_sector(trailer, |mfrc, blocks| {
            for (i, &block) in blocks.iter().enumerate() {
                let mut chunk = [0u8; BLOCK_SIZE];
                chunk.copy_from_slice(&data[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE]);
                mfrc.write_block(block, &chunk)?;
            }
            Ok(())
        })?;
        debug!(trailer = trailer.block(), id, "sector written");
        Ok((id, text[..text.len().min(SECTOR_DATA_SIZE)].to_string()))
    }

    pub fn write_sector(&mut self, text: &str, trailer: u8) -> Result<(u64, String)> {
        Trailer::new(trailer)?;
        pack_text(text)?;
        let retry = self.retry.clone();
        retry.run(|| self.write_sector_no_block(text, trailer))
    }

    /// Spreads `text` over the sectors, 48 bytes each. Sectors beyond the end of the text are
    /// left untouched, text beyond the last sector is dropped.
    pub fn write_sectors(&mut self, text: &str, trailers: &[u8]) -> Result<(u64, String)> {
        validate_all(trailers)?;
        let chunks = split_text(text)?;
        let mut id = 0;
        let mut text_all = String::new();
        for (&trailer, chunk) in trailers.iter().zip(&chunks) {
            let (i, written) = self.write_sector(chunk, trailer)?;
            id = i;
            text_all.push_str(&written);
        }
        Ok((id, text_all))
    }

    pub fn clear_sector_no_block(&mut self, trailer: u8) -> Result<u64> {
        let trailer = Trailer::new(trailer)?;
        let (id, ()) = self.with_sector(trailer, |mfrc, blocks| {
            for block in blocks {
                mfrc.write_block(block, &[0u8; BLOCK_SIZE])?;
            }
            Ok(())
        })?;
        debug!(trailer = trailer.block(), id, "sector cleared");
        Ok(id)
    }

    pub fn clear_sector(&mut self, trailer: u8) -> Result<u64> {
        Trailer::new(trailer)?;
        let retry = self.retry.clone();
        retry.run(|| self.clear_sector_no_block(trailer))
    }

    pub fn clear_sectors(&mut self, trailers: &[u8]) -> Result<u64> {
        validate_all(trailers)?;
        let mut id = 0;
        for &trailer in trailers {
            id = self.clear_sector(trailer)?;
        }
        Ok(id)
    }
}
