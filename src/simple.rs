use crate::com::Com;
use crate::mfrc522::Mfrc522;
use crate::rfid::Rfid;
use crate::Result;

/// Trailer of the sector used by [`SimpleRfid`]; text goes to blocks 8, 9 and 10.
pub const SIMPLE_TRAILER: u8 = 11;

/// Reads and writes up to 48 characters in a fixed sector with the factory key.
pub struct SimpleRfid<C: Com> {
    rfid: Rfid<C>,
}

impl<C: Com> SimpleRfid<C> {
    pub fn new(mfrc: Mfrc522<C>) -> Self {
        Self {
            rfid: Rfid::new(mfrc),
        }
    }

    pub fn read(&mut self) -> Result<(u64, String)> {
        self.rfid.read_sector(SIMPLE_TRAILER)
    }

    pub fn read_no_block(&mut self) -> Result<(u64, String)> {
        self.rfid.read_sector_no_block(SIMPLE_TRAILER)
    }

    pub fn write(&mut self, text: &str) -> Result<(u64, String)> {
        self.rfid.write_sector(text, SIMPLE_TRAILER)
    }

    pub fn write_no_block(&mut self, text: &str) -> Result<(u64, String)> {
        self.rfid.write_sector_no_block(text, SIMPLE_TRAILER)
    }

    pub fn read_id(&mut self) -> Result<u64> {
        self.rfid.read_id()
    }

    pub fn read_id_no_block(&mut self) -> Result<u64> {
        self.rfid.read_id_no_block()
    }

    pub fn into_inner(self) -> Rfid<C> {
        self.rfid
    }
}

impl<C: Com> From<Rfid<C>> for SimpleRfid<C> {
    fn from(rfid: Rfid<C>) -> Self {
        Self { rfid }
    }
}
