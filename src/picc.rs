use std::ops::{Deref, DerefMut};

use num_enum::IntoPrimitive;
use tracing::{debug, warn};

use crate::com::Com;
use crate::config::MifareKey;
use crate::mfrc522::{Command as PcdCommand, Mfrc522, Register, STATUS2_CRYPTO1_ON};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum Command {
    REQA = 0x26, // REQuest command, Type A. Invites PICCs in state IDLE to go to READY and prepare for anticollision or selection. 7 bit frame.
    WUPA = 0x52, // Wake-UP command, Type A. Invites PICCs in state IDLE and HALT to go to READY(*) and prepare for anticollision or selection. 7 bit frame.
    CT = 0x88,   // Cascade Tag. Not really a command, but used during anti collision.
    SelCl1 = 0x93, // Anti collision/Select, Cascade Level 1
    SelCl2 = 0x95, // Anti collision/Select, Cascade Level 2
    SelCl3 = 0x97, // Anti collision/Select, Cascade Level 3
    HLTA = 0x50, // HaLT command, Type A. Instructs an ACTIVE PICC to go to state HALT.
    // The commands used for MIFARE Classic (from http://www.mouser.com/ds/2/302/MF1S503x-89574.pdf, Section 9)
    // Use MFAuthent to authenticate access to a sector, then use these commands to read/write the blocks on the sector.
    MfAuthKeyA = 0x60, // Perform authentication with Key A
    MfAuthKeyB = 0x61, // Perform authentication with Key B
    MfRead = 0x30,     // Reads one 16 byte block from the authenticated sector of the PICC.
    MfWrite = 0xA0,    // Writes one 16 byte block to the authenticated sector of the PICC.
}

/// NVB of an anticollision frame: two valid bytes (SEL + NVB), no UID bits known.
const NVB_ANTICOLLISION: u8 = 0x20;
/// NVB of a select frame: seven valid bytes.
const NVB_SELECT: u8 = 0x70;
/// MIFARE ACK nibble.
const ACK: u8 = 0x0A;

pub const BLOCK_SIZE: usize = 16;

#[derive(Debug, PartialEq, Eq)]
pub enum Type {
    Unknown,
    Iso14443_4,    // PICC compliant with ISO/IEC 14443-4
    Iso18092,      // PICC compliant with ISO/IEC 18092 (NFC)
    MifareMini,    // MIFARE Classic protocol, 320 bytes
    Mifare1k,      // MIFARE Classic protocol, 1KB
    Mifare4k,      // MIFARE Classic protocol, 4KB
    MifareUL,      // MIFARE Ultralight or Ultralight C
    MifarePlus,    // MIFARE Plus
    TNP3XXX,       // Only mentioned in NXP AN 10833 MIFARE Type Identification Procedure
    NotComplete,   // SAK indicates UID is not complete.
}

pub fn get_type(sak: u8) -> Type {
    // http://www.nxp.com/documents/application_note/AN10833.pdf
    // 3.2 Coding of Select Acknowledge (SAK)
    // ignore 8-bit (iso14443 starts with LSBit = bit 1)
    match sak & 0x7F {
        0x04 => Type::NotComplete,
        0x09 => Type::MifareMini,
        0x08 => Type::Mifare1k,
        0x18 => Type::Mifare4k,
        0x00 => Type::MifareUL,
        0x10 | 0x11 => Type::MifarePlus,
        0x01 => Type::TNP3XXX,
        0x20 => Type::Iso14443_4,
        0x40 => Type::Iso18092,
        _ => Type::Unknown,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiccResponse {
    pub data: Vec<u8>,
    /// Length of the answer in bits; the last byte may be partial.
    pub bits: usize,
}

impl PiccResponse {
    /// Bits received given the FIFO level and the number of valid bits in the last byte (0 = all 8).
    pub fn bit_length(fifo_level: usize, last_bits: usize) -> usize {
        if last_bits != 0 && fifo_level > 0 {
            (fifo_level - 1) * 8 + last_bits
        } else {
            fifo_level * 8
        }
    }
}

/// Block check character: XOR of the bytes.
pub fn bcc(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Big-endian fold of the first five UID bytes.
pub fn uid_to_num(uid: &[u8]) -> u64 {
    uid.iter().take(5).fold(0u64, |n, &b| n * 256 + b as u64)
}

/// Four UID bytes followed by their check byte, as returned by anticollision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uid([u8; 5]);

impl Uid {
    pub fn from_response(data: &[u8]) -> Result<Uid> {
        let bytes: [u8; 5] = data.try_into().map_err(|_| Error::Length {
            expected: 40,
            actual: data.len() * 8,
        })?;
        if bcc(&bytes[..4]) != bytes[4] {
            return Err(Error::Checksum);
        }
        Ok(Uid(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 5] {
        &self.0
    }

    /// The UID proper, without the check byte.
    pub fn serial(&self) -> &[u8] {
        &self.0[..4]
    }

    pub fn to_num(&self) -> u64 {
        uid_to_num(&self.0)
    }
}

/// A write ACK is four bits with `0xA` in the low nibble.
pub fn check_ack(response: &PiccResponse) -> Result<()> {
    if response.bits != 4 {
        return Err(Error::Length {
            expected: 4,
            actual: response.bits,
        });
    }
    let ack = response.data.first().copied().unwrap_or(0);
    if ack & 0x0F != ACK {
        return Err(Error::Nak(ack));
    }
    Ok(())
}

impl<C: Com> Mfrc522<C> {
    /// REQA or WUPA. Returns the two byte ATQA.
    pub fn request(&mut self, mode: Command) -> Result<Vec<u8>> {
        // Short frame: only 7 bits of the single byte are sent.
        self.write_register(Register::BitFramingReg, 0x07)?;
        let response = self.transceive_data(&[mode as u8])?;
        if response.bits != 16 {
            return Err(Error::Length {
                expected: 16,
                actual: response.bits,
            });
        }
        Ok(response.data)
    }

    pub fn request_a(&mut self) -> Result<Vec<u8>> {
        self.request(Command::REQA)
    }

    /// Cascade level 1 anticollision with no known UID bits.
    pub fn anticollision(&mut self) -> Result<Uid> {
        self.write_register(Register::BitFramingReg, 0x00)?;
        let response = self.transceive_data(&[Command::SelCl1 as u8, NVB_ANTICOLLISION])?;
        Uid::from_response(&response.data)
    }

    /// Selects the card and returns its SAK.
    pub fn select_tag(&mut self, uid: &Uid) -> Result<u8> {
        let mut buf = vec![Command::SelCl1 as u8, NVB_SELECT];
        buf.extend_from_slice(uid.as_bytes());
        let frame = self.with_crc(&buf)?;
        let response = self.transceive_data(&frame)?;
        // SAK + CRC_A
        if response.bits != 24 {
            return Err(Error::Length {
                expected: 24,
                actual: response.bits,
            });
        }
        let sak = response.data[0];
        debug!(sak = format!("{sak:#04x}"), card = ?get_type(sak), "tag selected");
        Ok(sak)
    }

    /// Runs MFAuthent for the sector containing `block`. The caller owns stopping crypto1
    /// afterwards, see [`Mfrc522::session`].
    pub fn authenticate(&mut self, mode: Command, block: u8, key: &MifareKey, uid: &Uid) -> Result<()> {
        let mut buf = vec![mode as u8, block];
        buf.extend_from_slice(key);
        buf.extend_from_slice(uid.serial());

        let res = self.communicate_with_picc(PcdCommand::MFAuthent, &buf);
        if let Err(e) = &res {
            warn!(block, "authentication failed: {e}");
        }
        if self.read_register(Register::Status2Reg)? & STATUS2_CRYPTO1_ON == 0 {
            warn!(block, "crypto1 not active after authentication");
        }
        res.map(|_| ())
    }

    pub fn stop_crypto1(&mut self) -> Result<()> {
        self.clear_register_bitmask(Register::Status2Reg, STATUS2_CRYPTO1_ON)
    }

    pub fn read_block(&mut self, block: u8) -> Result<[u8; BLOCK_SIZE]> {
        let frame = self.with_crc(&[Command::MfRead as u8, block])?;
        let response = self.transceive_data(&frame)?;
        if response.bits == 4 {
            return Err(Error::Nak(response.data.first().copied().unwrap_or(0)));
        }
        let data: [u8; BLOCK_SIZE] = response.data.as_slice().try_into().map_err(|_| Error::Length {
            expected: BLOCK_SIZE * 8,
            actual: response.bits,
        })?;
        debug!(block, "read {:02x?}", data);
        Ok(data)
    }

    /// Two phase MIFARE write. The card may keep the old block contents when the data phase
    /// fails; nothing is rolled back.
    pub fn write_block(&mut self, block: u8, data: &[u8; BLOCK_SIZE]) -> Result<()> {
        let frame = self.with_crc(&[Command::MfWrite as u8, block])?;
        let ack = self.transceive_data(&frame)?;
        check_ack(&ack)?;

        let frame = self.with_crc(data)?;
        let res = self.transceive_data(&frame).and_then(|ack| check_ack(&ack));
        match &res {
            Ok(()) => debug!(block, "data written"),
            Err(e) => warn!(block, "card accepted the write but not the data: {e}"),
        }
        res
    }

    /// Borrows the chip for an authenticated exchange. Crypto1 is stopped when the session drops,
    /// whatever happened in between.
    pub fn session(&mut self) -> Session<'_, C> {
        Session { mfrc: self }
    }
}

pub struct Session<'a, C: Com> {
    mfrc: &'a mut Mfrc522<C>,
}

impl<C: Com> Deref for Session<'_, C> {
    type Target = Mfrc522<C>;

    fn deref(&self) -> &Self::Target {
        self.mfrc
    }
}

impl<C: Com> DerefMut for Session<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.mfrc
    }
}

impl<C: Com> Drop for Session<'_, C> {
    fn drop(&mut self) {
        if let Err(e) = self.mfrc.stop_crypto1() {
            warn!("could not stop crypto1: {e}");
        }
    }
}
