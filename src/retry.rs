use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::trace;

use crate::{Error, Result};

/// Cancels a blocking [`Rfid`](crate::Rfid) operation from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How the blocking operations repeat a failed attempt.
///
/// The default waits for a card forever, like the non-configurable readers it replaces.
#[derive(Debug, Clone, Default)]
pub struct Retry {
    max_attempts: Option<u32>,
    delay: Duration,
    cancel: Option<CancelToken>,
}

impl Retry {
    pub fn forever() -> Self {
        Self::default()
    }

    pub fn attempts(max: u32) -> Self {
        Self {
            max_attempts: Some(max.max(1)),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Calls `attempt` until it succeeds or fails with an error that a retry cannot fix.
    pub fn run<T>(&self, mut attempt: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempts = 0u32;
        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(Error::Cancelled);
            }
            let err = match attempt() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };
            attempts += 1;
            trace!(attempts, "attempt failed: {err}");
            if self.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(Error::Exhausted {
                    attempts,
                    last: Box::new(err),
                });
            }
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
        }
    }
}
