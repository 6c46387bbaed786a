//! A simulated MFRC522 with a MIFARE Classic 1K card in its field.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use rfid::com::Com;
use rfid::mfrc522::{Command, Register};
use rfid::{Config, Mfrc522};

pub const UID: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

/// ISO/IEC 14443-3 CRC_A, low byte first.
pub fn crc_a(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0x6363;
    for &b in data {
        let mut ch = b ^ (crc as u8);
        ch ^= ch << 4;
        crc = (crc >> 8) ^ ((ch as u16) << 8) ^ ((ch as u16) << 3) ^ ((ch as u16) >> 4);
    }
    [crc as u8, (crc >> 8) as u8]
}

fn crc_ok(frame: &[u8]) -> bool {
    frame.len() >= 2 && crc_a(&frame[..frame.len() - 2]) == frame[frame.len() - 2..]
}

pub struct Card {
    pub uid: [u8; 4],
    pub key: [u8; 6],
    pub blocks: [[u8; 16]; 64],
    /// REQA attempts the card ignores before it enters the field.
    pub absent_for: usize,
    pub corrupt_bcc: bool,
    /// Answer the data phase of a write with a NAK.
    pub nak_data_phase: bool,
    /// Block reads that go unanswered.
    pub drop_reads: usize,
    /// Cut ATQA, SAK and block answers short.
    pub short_answers: bool,
    /// ErrorReg bits raised after each answered transceive.
    pub frame_error: u8,
    authenticated: Option<u8>,
    pending_write: Option<u8>,
}

impl Card {
    pub fn new() -> Self {
        let mut blocks = [[0u8; 16]; 64];
        for t in (3..64).step_by(4) {
            // key A, access bits, key B
            blocks[t] = [
                0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x07, 0x80, 0x69, 0xFF, 0xFF, 0xFF, 0xFF,
                0xFF, 0xFF,
            ];
        }
        Self {
            uid: UID,
            key: [0xFF; 6],
            blocks,
            absent_for: 0,
            corrupt_bcc: false,
            nak_data_phase: false,
            drop_reads: 0,
            short_answers: false,
            frame_error: 0,
            authenticated: None,
            pending_write: None,
        }
    }

    fn uid_frame(&self) -> Vec<u8> {
        let mut frame = self.uid.to_vec();
        let bcc = self.uid.iter().fold(0, |a, b| a ^ b);
        frame.push(if self.corrupt_bcc { bcc ^ 0xFF } else { bcc });
        frame
    }

    /// Answer bytes and the valid bits of the last one, `None` when the card stays silent.
    fn answer(&mut self, frame: &[u8], tx_last_bits: u8) -> Option<(Vec<u8>, u8)> {
        if let Some(block) = self.pending_write.take() {
            if frame.len() != 18 || !crc_ok(frame) || self.nak_data_phase {
                return Some((vec![0x04], 4));
            }
            self.blocks[block as usize].copy_from_slice(&frame[..16]);
            return Some((vec![0x0A], 4));
        }
        match frame {
            [0x26] | [0x52] if tx_last_bits == 7 => {
                if self.absent_for > 0 {
                    self.absent_for -= 1;
                    return None;
                }
                self.authenticated = None;
                if self.short_answers {
                    return Some((vec![0x04], 0));
                }
                Some((vec![0x04, 0x00], 0))
            }
            [0x93, 0x20] => Some((self.uid_frame(), 0)),
            [0x93, 0x70, rest @ ..] if rest.len() == 7 && crc_ok(frame) => {
                if rest[..4] != self.uid {
                    return None;
                }
                let sak = 0x08;
                let crc = crc_a(&[sak]);
                if self.short_answers {
                    return Some((vec![sak, crc[0]], 0));
                }
                Some((vec![sak, crc[0], crc[1]], 0))
            }
            [0x30, block, _, _] if crc_ok(frame) => {
                if self.authenticated != Some(block / 4) {
                    return None;
                }
                if self.drop_reads > 0 {
                    self.drop_reads -= 1;
                    return None;
                }
                let mut data = self.blocks[*block as usize].to_vec();
                if self.short_answers {
                    data.truncate(10);
                    return Some((data, 0));
                }
                let crc = crc_a(&data);
                data.extend_from_slice(&crc);
                Some((data, 0))
            }
            [0xA0, block, _, _] if crc_ok(frame) => {
                if self.authenticated != Some(block / 4) || block % 4 == 3 {
                    return Some((vec![0x04], 4));
                }
                self.pending_write = Some(*block);
                Some((vec![0x0A], 4))
            }
            _ => None,
        }
    }

    fn authenticate(&mut self, frame: &[u8]) -> bool {
        match frame {
            [0x60 | 0x61, block, key @ .., u0, u1, u2, u3] if key.len() == 6 => {
                if key != self.key || [*u0, *u1, *u2, *u3] != self.uid {
                    return false;
                }
                self.authenticated = Some(block / 4);
                true
            }
            _ => false,
        }
    }
}

pub struct State {
    pub regs: [u8; 64],
    pub fifo: VecDeque<u8>,
    pub card: Option<Card>,
    pub reset_line: bool,
    pub transfers: usize,
    /// Writes to Status2Reg that leave MFCrypto1On cleared.
    pub crypto_stops: usize,
}

impl State {
    fn power_on_defaults(&mut self) {
        self.regs = [0; 64];
        self.regs[Register::TxControlReg as usize] = 0x80;
        self.regs[Register::VersionReg as usize] = 0x92;
        self.fifo.clear();
    }

    fn read(&mut self, address: u8) -> u8 {
        let reg = (address >> 1) & 0x3F;
        match Register::try_from(reg) {
            Ok(Register::FIFODataReg) => self.fifo.pop_front().unwrap_or(0),
            Ok(Register::FIFOLevelReg) => self.fifo.len() as u8,
            _ => self.regs[reg as usize],
        }
    }

    fn write(&mut self, reg: u8, value: u8) {
        match Register::try_from(reg) {
            Ok(Register::CommandReg) => self.command(value),
            Ok(Register::ComIrqReg) | Ok(Register::DivIrqReg) => {
                if value & 0x80 != 0 {
                    self.regs[reg as usize] |= value & 0x7F;
                } else {
                    self.regs[reg as usize] &= !(value & 0x7F);
                }
            }
            Ok(Register::FIFOLevelReg) => {
                if value & 0x80 != 0 {
                    self.fifo.clear();
                }
            }
            Ok(Register::FIFODataReg) => self.fifo.push_back(value),
            Ok(Register::BitFramingReg) => {
                self.regs[reg as usize] = value;
                let transceiving = self.regs[Register::CommandReg as usize] == Command::Transceive as u8;
                if value & 0x80 != 0 && transceiving {
                    self.transceive();
                }
            }
            Ok(Register::Status2Reg) => {
                self.regs[reg as usize] = value;
                if value & 0x08 == 0 {
                    self.crypto_stops += 1;
                    if let Some(card) = self.card.as_mut() {
                        card.authenticated = None;
                    }
                }
            }
            _ => self.regs[reg as usize] = value,
        }
    }

    fn command(&mut self, value: u8) {
        self.regs[Register::CommandReg as usize] = value;
        let Ok(command) = Command::try_from(value & 0x0F) else {
            return;
        };
        if command != Command::Idle {
            self.regs[Register::ErrorReg as usize] = 0;
        }
        match command {
            Command::SoftReset => self.power_on_defaults(),
            Command::CalcCRC => {
                let data: Vec<u8> = self.fifo.drain(..).collect();
                let crc = crc_a(&data);
                self.regs[Register::CRCResultRegLow as usize] = crc[0];
                self.regs[Register::CRCResultRegHigh as usize] = crc[1];
                self.regs[Register::DivIrqReg as usize] |= 0x04;
            }
            Command::MFAuthent => {
                let frame: Vec<u8> = self.fifo.drain(..).collect();
                let ok = self.card.as_mut().is_some_and(|card| card.authenticate(&frame));
                if ok {
                    self.regs[Register::Status2Reg as usize] |= 0x08;
                    self.regs[Register::ComIrqReg as usize] |= 0x10;
                } else {
                    self.regs[Register::ErrorReg as usize] = 0x01;
                    self.regs[Register::ComIrqReg as usize] |= 0x12;
                }
            }
            _ => {}
        }
    }

    fn transceive(&mut self) {
        let frame: Vec<u8> = self.fifo.drain(..).collect();
        let tx_last_bits = self.regs[Register::BitFramingReg as usize] & 0x07;
        let answer = self.card.as_mut().and_then(|card| {
            let error = card.frame_error;
            card.answer(&frame, tx_last_bits).map(|a| (a, error))
        });
        match answer {
            Some(((bytes, last_bits), error)) => {
                self.regs[Register::ErrorReg as usize] |= error;
                self.fifo.extend(bytes);
                self.regs[Register::ControlReg as usize] = last_bits;
                self.regs[Register::ComIrqReg as usize] |= 0x30;
            }
            None => {
                self.regs[Register::ControlReg as usize] = 0;
                self.regs[Register::ComIrqReg as usize] |= 0x01;
            }
        }
    }
}

/// Cloneable handle; the test keeps one to inspect the card while the driver owns another.
#[derive(Clone)]
pub struct SimReader(pub Rc<RefCell<State>>);

impl SimReader {
    pub fn new(card: Option<Card>) -> Self {
        let mut state = State {
            regs: [0; 64],
            fifo: VecDeque::new(),
            card,
            reset_line: false,
            transfers: 0,
            crypto_stops: 0,
        };
        state.power_on_defaults();
        SimReader(Rc::new(RefCell::new(state)))
    }

    pub fn with_card() -> Self {
        Self::new(Some(Card::new()))
    }

    pub fn card<R>(&self, f: impl FnOnce(&mut Card) -> R) -> R {
        let mut state = self.0.borrow_mut();
        f(state.card.as_mut().expect("no card in the field"))
    }

    pub fn reg(&self, reg: Register) -> u8 {
        self.0.borrow().regs[reg as usize]
    }

    pub fn transfers(&self) -> usize {
        self.0.borrow().transfers
    }

    pub fn crypto_stops(&self) -> usize {
        self.0.borrow().crypto_stops
    }
}

impl Com for SimReader {
    fn transfer(&mut self, data: &[u8]) -> rfid::Result<Vec<u8>> {
        let mut state = self.0.borrow_mut();
        state.transfers += 1;
        let mut rx = vec![0u8; data.len()];
        if data.is_empty() {
            return Ok(rx);
        }
        if data[0] & 0x80 != 0 {
            for i in 1..data.len() {
                rx[i] = state.read(data[i - 1]);
            }
        } else {
            let reg = (data[0] >> 1) & 0x3F;
            for &value in &data[1..] {
                state.write(reg, value);
            }
        }
        Ok(rx)
    }

    fn set_reset(&mut self, high: bool) -> rfid::Result<()> {
        self.0.borrow_mut().reset_line = high;
        Ok(())
    }
}

pub fn config() -> Config {
    Config::default()
        .with_poll_interval(Duration::ZERO)
        .with_reset_delay(Duration::ZERO)
        .with_poll_limit(50)
}

pub fn chip(sim: &SimReader) -> Mfrc522<SimReader> {
    let mut mfrc = Mfrc522::new(sim.clone(), config());
    mfrc.init().expect("init");
    mfrc
}
