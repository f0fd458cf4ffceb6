//! Bounded retry for transient storage faults.
//!
//! Only errors that report themselves as transient are retried. Capacity
//! conflicts and validation failures are business outcomes and surface on
//! the first attempt.

use rihla_core::{BookingError, LedgerError, StorageError};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Errors that may succeed if the same call is repeated shortly after.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        StorageError::is_transient(self)
    }
}

impl Transient for LedgerError {
    fn is_transient(&self) -> bool {
        LedgerError::is_transient(self)
    }
}

impl Transient for BookingError {
    fn is_transient(&self) -> bool {
        BookingError::is_transient(self)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: usize,
    /// Fixed delay before each retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub const MIN_BACKOFF: Duration = Duration::from_millis(50);
    pub const MAX_BACKOFF: Duration = Duration::from_millis(200);

    /// Backoff is clamped to 50..=200ms.
    pub fn new(max_retries: usize, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff: backoff.clamp(Self::MIN_BACKOFF, Self::MAX_BACKOFF),
        }
    }

    pub fn from_millis(max_retries: usize, backoff_ms: u64) -> Self {
        Self::new(max_retries, Duration::from_millis(backoff_ms))
    }

    /// Run `op`, repeating it while it fails transiently and budget remains.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "{} failed transiently (attempt {}/{}): {}; retrying in {:?}",
                        what,
                        attempt,
                        self.max_retries,
                        e,
                        self.backoff
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
