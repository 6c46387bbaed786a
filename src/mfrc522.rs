use std::thread;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use tracing::{debug, info, trace};

use crate::com::Com;
use crate::config::Config;
use crate::picc::PiccResponse;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Register {
    // Reserved         = 0x00,
    CommandReg = 0x01,
    ComIEnReg = 0x02,
    DivIEnReg = 0x03,
    ComIrqReg = 0x04,
    DivIrqReg = 0x05,
    ErrorReg = 0x06,
    Status1Reg = 0x07,
    Status2Reg = 0x08,
    FIFODataReg = 0x09,
    FIFOLevelReg = 0x0A,
    WaterLevelReg = 0x0B,
    ControlReg = 0x0C,
    BitFramingReg = 0x0D,
    CollReg = 0x0E,
    // Reserved         = 0x0F,
    // Reserved         = 0x10,
    ModeReg = 0x11,
    TxModeReg = 0x12,
    RxModeReg = 0x13,
    TxControlReg = 0x14,
    TxASKReg = 0x15,
    TxSelReg = 0x16,
    RxSelReg = 0x17,
    RxThresholdReg = 0x18,
    DemodReg = 0x19,
    // Reserved         = 0x1A,
    // Reserved         = 0x1B,
    MfTxReg = 0x1C,
    MfRxReg = 0x1D,
    // Reserved         = 0x1E,
    SerialSpeedReg = 0x1F,
    // Reserved         = 0x20,
    CRCResultRegHigh = 0x21,
    CRCResultRegLow = 0x22,
    // Reserved         = 0x23,
    ModWidthReg = 0x24,
    // Reserved         = 0x25,
    RFCfgReg = 0x26,
    GsNReg = 0x27,
    CWGsPReg = 0x28,
    ModGsPReg = 0x29,
    TModeReg = 0x2A,
    TPrescalerReg = 0x2B,
    TReloadRegHigh = 0x2C,
    TReloadRegLow = 0x2D,
    TCounterValRegHigh = 0x2E,
    TCounterValRegLow = 0x2F,
    // Reserved         = 0x30,
    TestSel1Reg = 0x31,
    TestSel2Reg = 0x32,
    TestPinEnReg = 0x33,
    TestPinValueReg = 0x34,
    TestBusReg = 0x35,
    AutoTestReg = 0x36,
    VersionReg = 0x37,
    AnalogTestReg = 0x38,
    TestDAC1Reg = 0x39,
    TestDAC2Reg = 0x3A,
    TestADCReg = 0x3B,
    // Reserved         = 0x3C-0x3F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Command {
    Idle = 0b0000,
    Mem = 0b0001,
    GenerateRandomId = 0b0010,
    CalcCRC = 0b0011,
    Transmit = 0b0100,
    NoCmdChange = 0b0111,
    Receive = 0b1000,
    Transceive = 0b1100,
    MFAuthent = 0b1110,
    SoftReset = 0b1111,
}

// ComIrqReg / ComIEnReg bits
pub const IRQ_TIMER: u8 = 0x01;
pub const IRQ_ERR: u8 = 0x02;
pub const IRQ_IDLE: u8 = 0x10;
pub const IRQ_RX: u8 = 0x20;
pub const IRQ_TX: u8 = 0x40;
/// Set1 / IRqInv: on ComIrqReg and DivIrqReg, write 1 to set the marked bits instead of clearing them.
pub const IRQ_SET: u8 = 0x80;
// DivIrqReg
pub const DIV_IRQ_CRC: u8 = 0x04;
// ErrorReg: BufferOvfl CollErr ParityErr ProtocolErr
pub const ERROR_MASK: u8 = 0x1B;
// Status2Reg
pub const STATUS2_CRYPTO1_ON: u8 = 0x08;
// FIFOLevelReg
pub const FIFO_FLUSH: u8 = 0x80;
// BitFramingReg
pub const START_SEND: u8 = 0x80;
// ControlReg: RxLastBits
pub const RX_LAST_BITS: u8 = 0x07;
// CommandReg
pub const POWER_DOWN: u8 = 0x10;
// TxControlReg: Tx1RFEn Tx2RFEn
pub const ANTENNA_BITS: u8 = 0x03;

/// Upper bound of bytes drained from the FIFO per exchange.
pub const MAX_LEN: usize = 16;

pub struct Mfrc522<C> {
    com: C,
    config: Config,
}

impl<C: Com> Mfrc522<C> {
    pub fn new(com: C, config: Config) -> Self {
        Self { com, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Switches the antenna off and hands the transport back.
    pub fn release(mut self) -> Result<C> {
        self.antenna_off()?;
        Ok(self.com)
    }

    fn register_to_readvalue(reg: Register) -> u8 {
        (((reg as u8) << 1) | 0b1000_0000) & 0b1111_1110
    }

    fn register_to_writevalue(reg: Register) -> u8 {
        ((reg as u8) << 1) & 0b0111_1110
    }

    pub fn read_register(&mut self, reg: Register) -> Result<u8> {
        let rval = Self::register_to_readvalue(reg);
        let rx_buf = self.com.transfer(&[rval, 0])?;
        let value = *rx_buf.get(1).ok_or(Error::Com)?;
        trace!("read {:#04x} from {:?}", value, reg);
        Ok(value)
    }

    /// Reads `count` bytes from the same register in one burst.
    pub fn read_multiple(&mut self, reg: Register, count: usize) -> Result<Vec<u8>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let address = Self::register_to_readvalue(reg);
        // Each address byte clocks out the value for the one before it, the trailing 0 ends the burst.
        let mut tx_buf = vec![address; count];
        tx_buf.push(0);
        let rx_buf = self.com.transfer(&tx_buf)?;
        if rx_buf.len() != count + 1 {
            return Err(Error::Com);
        }
        trace!("read {:02x?} from {:?}", &rx_buf[1..], reg);
        Ok(rx_buf[1..].to_vec())
    }

    pub fn write_register(&mut self, reg: Register, value: u8) -> Result<()> {
        let rval = Self::register_to_writevalue(reg);
        self.com.transfer(&[rval, value])?;
        trace!("wrote {:#04x} to {:?}", value, reg);
        Ok(())
    }

    pub fn write_multiple(&mut self, reg: Register, value: &[u8]) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        let rval = Self::register_to_writevalue(reg);
        self.com.transfer(&[&[rval], value].concat())?;
        trace!("wrote {:02x?} to {:?}", value, reg);
        Ok(())
    }

    pub fn set_register_bitmask(&mut self, reg: Register, mask: u8) -> Result<()> {
        let tmp = self.read_register(reg)?;
        self.write_register(reg, tmp | mask)?;
        Ok(())
    }

    pub fn clear_register_bitmask(&mut self, reg: Register, mask: u8) -> Result<()> {
        let tmp = self.read_register(reg)?;
        self.write_register(reg, tmp & !mask)?;
        Ok(())
    }

    pub fn version(&mut self) -> Result<u8> {
        self.read_register(Register::VersionReg)
    }

    /// Hardware and soft reset followed by the timer, modulation and CRC setup. Leaves the antenna on.
    pub fn init(&mut self) -> Result<()> {
        self.com.set_reset(true)?;
        self.reset()?;

        // TPreScaler = 0xD3E => f_timer = 13.56 MHz / (2*3390+1) = 2 kHz. Reload 30 => 15 ms before the timer IRQ.
        self.write_register(Register::TModeReg, 0x8D)?; // TAuto=1; timer starts automatically at the end of the transmission
        self.write_register(Register::TPrescalerReg, 0x3E)?;
        self.write_register(Register::TReloadRegLow, 30)?;
        self.write_register(Register::TReloadRegHigh, 0)?;
        self.write_register(Register::TxASKReg, 0x40)?; // Force a 100 % ASK modulation independent of the ModGsPReg register setting
        self.write_register(Register::ModeReg, 0x3D)?; // CRC preset 0x6363 (ISO 14443-3 part 6.2.4)
        self.antenna_on()?;

        let version = self.version()?;
        info!(version = format!("{version:#04x}"), "MFRC522 initialised");
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.write_register(Register::CommandReg, Command::SoftReset as u8)?;
        let mut count = 0;
        loop {
            thread::sleep(self.config.reset_delay);
            let cmd_val = self.read_register(Register::CommandReg)?;
            if cmd_val & POWER_DOWN == 0 || count >= 3 {
                break;
            }
            count += 1;
        }
        Ok(())
    }

    pub fn antenna_on(&mut self) -> Result<()> {
        let control_reg = self.read_register(Register::TxControlReg)?;
        if (control_reg & ANTENNA_BITS) != ANTENNA_BITS {
            self.write_register(Register::TxControlReg, control_reg | ANTENNA_BITS)?;
        }
        Ok(())
    }

    pub fn antenna_off(&mut self) -> Result<()> {
        let control_reg = self.read_register(Register::TxControlReg)?;
        if control_reg & ANTENNA_BITS != 0 {
            self.write_register(Register::TxControlReg, control_reg & !ANTENNA_BITS)?;
        }
        Ok(())
    }

    /// Runs the CRC coprocessor over `data`. Returns `[low, high]`, the order the CRC is sent in.
    pub fn calculate_crc(&mut self, data: &[u8]) -> Result<[u8; 2]> {
        self.write_register(Register::CommandReg, Command::Idle as u8)?;
        self.write_register(Register::DivIrqReg, DIV_IRQ_CRC)?;
        self.write_register(Register::FIFOLevelReg, FIFO_FLUSH)?;
        self.write_multiple(Register::FIFODataReg, data)?;
        self.write_register(Register::CommandReg, Command::CalcCRC as u8)?;

        for _ in 0..self.config.crc_poll_limit {
            let n = self.read_register(Register::DivIrqReg)?;
            if n & DIV_IRQ_CRC != 0 {
                let res_low = self.read_register(Register::CRCResultRegLow)?;
                let res_high = self.read_register(Register::CRCResultRegHigh)?;
                return Ok([res_low, res_high]);
            }
        }
        Err(Error::Timeout)
    }

    /// `data` followed by its CRC_A.
    pub fn with_crc(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let crc = self.calculate_crc(data)?;
        Ok([data, &crc].concat())
    }

    /// Executes one chip command and collects the card's answer.
    ///
    /// `Err(Error::NoTag)` when the chip timer expired without an answer, `Err(Error::Timeout)`
    /// when the poll budget ran out, `Err(Error::Chip(_))` when the error register flagged the
    /// frame. Only [`Command::Transceive`] reads the FIFO back.
    pub fn communicate_with_picc(&mut self, command: Command, send_data: &[u8]) -> Result<PiccResponse> {
        let (irq_en, wait_irq) = match command {
            Command::MFAuthent => (IRQ_IDLE | IRQ_ERR, IRQ_IDLE),
            Command::Transceive => (0x77, IRQ_RX | IRQ_IDLE),
            _ => (0x00, 0x00),
        };

        self.write_register(Register::ComIEnReg, irq_en | IRQ_SET)?;
        self.write_register(Register::ComIrqReg, !IRQ_SET)?; // Clear all seven interrupt request bits.
        self.write_register(Register::FIFOLevelReg, FIFO_FLUSH)?;
        self.write_register(Register::CommandReg, Command::Idle as u8)?; // Stop any active command.
        self.write_multiple(Register::FIFODataReg, send_data)?;
        self.write_register(Register::CommandReg, command as u8)?;

        if command == Command::Transceive {
            self.set_register_bitmask(Register::BitFramingReg, START_SEND)?;
        }

        let mut irq = 0;
        let mut fired = false;
        for _ in 0..self.config.poll_limit {
            thread::sleep(self.config.poll_interval);
            irq = self.read_register(Register::ComIrqReg)?;
            if irq & (IRQ_TIMER | wait_irq) != 0 {
                fired = true;
                break;
            }
        }

        if command == Command::Transceive {
            self.clear_register_bitmask(Register::BitFramingReg, START_SEND)?;
        }

        if !fired {
            debug!(?command, "no interrupt within {} polls", self.config.poll_limit);
            return Err(Error::Timeout);
        }

        let error_reg_value = self.read_register(Register::ErrorReg)?;
        if error_reg_value & ERROR_MASK != 0 {
            debug!(?command, error = format!("{error_reg_value:#04x}"), "chip reported an error");
            return Err(Error::Chip(error_reg_value & ERROR_MASK));
        }

        if irq & irq_en & IRQ_TIMER != 0 {
            return Err(Error::NoTag);
        }

        let mut response = PiccResponse {
            data: Vec::new(),
            bits: 0,
        };
        if command == Command::Transceive {
            let level = self.read_register(Register::FIFOLevelReg)? as usize;
            let last_bits = (self.read_register(Register::ControlReg)? & RX_LAST_BITS) as usize;
            response.bits = PiccResponse::bit_length(level, last_bits);
            let n = level.clamp(1, MAX_LEN);
            response.data = self.read_multiple(Register::FIFODataReg, n)?;
        }
        debug!(?command, bits = response.bits, "exchange finished");
        Ok(response)
    }

    pub fn transceive_data(&mut self, send_data: &[u8]) -> Result<PiccResponse> {
        self.communicate_with_picc(Command::Transceive, send_data)
    }
}
