use tracing::debug;

use crate::com::Com;
use crate::mfrc522::{Mfrc522, Register};
use crate::picc::BLOCK_SIZE;
use crate::{Error, Result};

/// Payload bytes of one sector: three data blocks.
pub const SECTOR_DATA_SIZE: usize = 3 * BLOCK_SIZE;

/// Left-justifies `text` in a sector: truncated to 48 bytes, padded with NUL.
pub fn pack_text(text: &str) -> Result<[u8; SECTOR_DATA_SIZE]> {
    if !text.is_ascii() {
        return Err(Error::NonAscii);
    }
    let mut data = [0u8; SECTOR_DATA_SIZE];
    let len = text.len().min(SECTOR_DATA_SIZE);
    data[..len].copy_from_slice(&text.as_bytes()[..len]);
    Ok(data)
}

/// Splits `text` into 48 byte pieces, one per sector. The last piece is padded with NUL.
pub fn split_text(text: &str) -> Result<Vec<String>> {
    if !text.is_ascii() {
        return Err(Error::NonAscii);
    }
    let mut chunks: Vec<String> = text
        .as_bytes()
        .chunks(SECTOR_DATA_SIZE)
        .map(|c| c.iter().map(|&b| b as char).collect())
        .collect();
    match chunks.last_mut() {
        Some(last) => {
            let pad = SECTOR_DATA_SIZE - last.len();
            last.extend(std::iter::repeat('\0').take(pad));
        }
        None => chunks.push("\0".repeat(SECTOR_DATA_SIZE)),
    }
    Ok(chunks)
}

/// One char per byte, as stored on the card.
pub fn bytes_to_text(data: &[u8]) -> String {
    data.iter().map(|&b| b as char).collect()
}

/// Configuration and status registers logged by [`dump_registers`].
pub const DUMPED_REGISTERS: [Register; 39] = [
    Register::CommandReg,
    Register::ComIEnReg,
    Register::DivIEnReg,
    Register::ComIrqReg,
    Register::DivIrqReg,
    Register::ErrorReg,
    Register::Status1Reg,
    Register::Status2Reg,
    Register::FIFOLevelReg,
    Register::WaterLevelReg,
    Register::ControlReg,
    Register::BitFramingReg,
    Register::CollReg,
    Register::ModeReg,
    Register::TxModeReg,
    Register::RxModeReg,
    Register::TxControlReg,
    Register::TxASKReg,
    Register::TxSelReg,
    Register::RxSelReg,
    Register::RxThresholdReg,
    Register::DemodReg,
    Register::MfTxReg,
    Register::MfRxReg,
    Register::SerialSpeedReg,
    Register::CRCResultRegHigh,
    Register::CRCResultRegLow,
    Register::ModWidthReg,
    Register::RFCfgReg,
    Register::GsNReg,
    Register::CWGsPReg,
    Register::ModGsPReg,
    Register::TModeReg,
    Register::TPrescalerReg,
    Register::TReloadRegHigh,
    Register::TReloadRegLow,
    Register::TCounterValRegHigh,
    Register::TCounterValRegLow,
    Register::VersionReg,
];

/// Reads every register in [`DUMPED_REGISTERS`] and logs it at debug level.
pub fn dump_registers<C: Com>(mfrc: &mut Mfrc522<C>) -> Result<()> {
    for reg in DUMPED_REGISTERS {
        let value = mfrc.read_register(reg)?;
        debug!(?reg, value = format!("{value:#04x}"));
    }
    Ok(())
}
