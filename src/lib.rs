//! Driver for the NXP MFRC522 contactless reader and MIFARE Classic cards.
//!
//! The crate is layered the way the chip is used:
//!
//! - [`com`]: the byte transport (SPI transfers and the reset line).
//! - [`mfrc522`]: register access, the command executor and the CRC coprocessor.
//! - [`picc`]: the card protocol (request, anticollision, select, authentication, block I/O).
//! - [`rfid`]: sector level read, write and clear of text, with retries.
//!
//! ```no_run
//! # fn demo<C: rfid::com::Com>(com: C) -> rfid::Result<()> {
//! let mut mfrc522 = rfid::Mfrc522::new(com, rfid::Config::default());
//! mfrc522.init()?;
//! let mut reader = rfid::Rfid::new(mfrc522);
//! let (id, text) = reader.read_sector(11)?;
//! println!("{id}: {}", text.trim_end_matches('\0'));
//! # Ok(())
//! # }
//! ```

pub mod com;
pub mod com_spi;
pub mod config;
pub mod mfrc522;
pub mod picc;
pub mod retry;
pub mod rfid;
pub mod simple;
pub mod util;

pub use crate::config::{Config, MifareKey, DEFAULT_KEY};
pub use crate::mfrc522::Mfrc522;
pub use crate::picc::{PiccResponse, Uid};
pub use crate::retry::{CancelToken, Retry};
pub use crate::rfid::{Rfid, Trailer};
pub use crate::simple::SimpleRfid;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error")]
    Com,
    #[error("no tag responded")]
    NoTag,
    #[error("chip did not complete the command in time")]
    Timeout,
    #[error("chip error register {0:#04x}")]
    Chip(u8),
    #[error("UID check byte mismatch")]
    Checksum,
    #[error("expected {expected} bits, received {actual}")]
    Length { expected: usize, actual: usize },
    #[error("card answered {0:#x} instead of ACK")]
    Nak(u8),
    #[error("block {0} is not a sector trailer")]
    InvalidTrailer(u8),
    #[error("text is not ASCII")]
    NonAscii,
    #[error("invalid argument")]
    Invalid,
    #[error("cancelled")]
    Cancelled,
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<Error>,
    },
}

impl Error {
    /// Whether a fresh attempt from card discovery can succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NoTag
                | Error::Timeout
                | Error::Chip(_)
                | Error::Checksum
                | Error::Length { .. }
                | Error::Nak(_)
        )
    }

    pub fn status(&self) -> Status {
        match self {
            Error::NoTag => Status::NoTag,
            _ => Status::Error,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Outcome of a single exchange with a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// No card answered in this attempt.
    NoTag,
    /// A card answered but the response failed validation.
    Error,
}

impl Status {
    pub fn of<T>(result: &Result<T>) -> Status {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}
