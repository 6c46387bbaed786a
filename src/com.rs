use crate::Result;

/// Byte transport to the reader chip.
///
/// `transfer` is one full-duplex bus transaction: the returned buffer has the same
/// length as `data` and holds what the chip shifted out while `data` was shifted in.
#[cfg_attr(test, mockall::automock)]
pub trait Com {
    fn transfer(&mut self, data: &[u8]) -> Result<Vec<u8>>;
    fn set_reset(&mut self, high: bool) -> Result<()>;
}
