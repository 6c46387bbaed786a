use std::time::Duration;

pub type MifareKey = [u8; 6];

/// Factory default key of MIFARE Classic cards.
pub const DEFAULT_KEY: MifareKey = [0xFF; 6];

/// Chip timing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of interrupt register polls before an exchange is abandoned.
    pub poll_limit: u16,
    /// Delay before each interrupt register poll.
    pub poll_interval: Duration,
    /// Number of polls for the CRC coprocessor.
    pub crc_poll_limit: u16,
    /// Settle time after a soft reset.
    pub reset_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_limit: 2000,
            poll_interval: Duration::from_micros(350),
            crc_poll_limit: 255,
            reset_delay: Duration::from_millis(50),
        }
    }
}

impl Config {
    pub fn with_poll_limit(mut self, limit: u16) -> Self {
        self.poll_limit = limit;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_crc_poll_limit(mut self, limit: u16) -> Self {
        self.crc_poll_limit = limit;
        self
    }

    pub fn with_reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = delay;
        self
    }
}
