//! Polling interval with an enforced lower bound.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Shortest polling interval a device will be driven at.
pub const MIN_POLL_INTERVAL_MS: u64 = 200;

/// Interval used when nothing is configured.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// A validated polling interval (milliseconds, `>= MIN_POLL_INTERVAL_MS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PollInterval(u64);

impl PollInterval {
    pub fn from_millis(ms: u64) -> Result<Self, CoreError> {
        if ms < MIN_POLL_INTERVAL_MS {
            return Err(CoreError::Validation(format!(
                "Interval must be >= {MIN_POLL_INTERVAL_MS} ms, got {ms}"
            )));
        }
        Ok(Self(ms))
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self(DEFAULT_POLL_INTERVAL_MS)
    }
}

impl TryFrom<u64> for PollInterval {
    type Error = CoreError;

    fn try_from(ms: u64) -> Result<Self, Self::Error> {
        Self::from_millis(ms)
    }
}

impl From<PollInterval> for u64 {
    fn from(i: PollInterval) -> Self {
        i.0
    }
}
