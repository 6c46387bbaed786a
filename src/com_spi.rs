use super::com::Com;
use crate::{Error, Result};
use embedded_hal::blocking::spi;
use embedded_hal::digital::v2::OutputPin;

/// [`Com`] over an `embedded-hal` SPI bus with a reset (NRSTPD) pin.
pub struct ComSpi<SPI, RST> {
    com: SPI,
    rst: RST,
}
impl<SPI, RST> ComSpi<SPI, RST> {
    pub fn new(spi: SPI, rst: RST) -> Self {
        Self { com: spi, rst }
    }
    pub fn free(self) -> (SPI, RST) {
        (self.com, self.rst)
    }
}
impl<SPI, RST> Com for ComSpi<SPI, RST>
where
    SPI: spi::Transfer<u8>,
    RST: OutputPin,
{
    fn transfer(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut buf = data.to_vec();
        if self.com.transfer(&mut buf).is_err() {
            return Err(Error::Com);
        }
        Ok(buf)
    }
    fn set_reset(&mut self, high: bool) -> Result<()> {
        let res = if high {
            self.rst.set_high()
        } else {
            self.rst.set_low()
        };
        res.map_err(|_| Error::Com)
    }
}
