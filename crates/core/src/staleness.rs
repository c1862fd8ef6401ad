//! Device-wide staleness state machine.
//!
//! `Healthy -> Stale` when the silence since the last measurement exceeds
//! the configured limit; the transition is reported exactly once.
//! `Stale -> Healthy` on the next measurement.
//!
//! Time is passed in as an elapsed [`Duration`] so the caller decides which
//! clock drives the watchdog.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchdogState {
    Healthy,
    Stale,
}

/// How much silence is tolerated before the device is declared stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    /// Margin added on top of the expected polling interval.
    pub grace: Duration,
}

impl StalenessPolicy {
    /// Silence limit for a given expected polling interval.
    pub fn limit_for(&self, expected_interval: Duration) -> Duration {
        expected_interval + self.grace
    }
}

#[derive(Debug)]
pub struct StalenessMonitor {
    state: WatchdogState,
}

impl Default for StalenessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl StalenessMonitor {
    pub fn new() -> Self {
        Self {
            state: WatchdogState::Healthy,
        }
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// A measurement arrived. Returns `true` if this cleared a stale state.
    pub fn record_measurement(&mut self) -> bool {
        let recovered = self.state == WatchdogState::Stale;
        self.state = WatchdogState::Healthy;
        recovered
    }

    /// Periodic check. Returns `Some(elapsed)` only on the transition into
    /// `Stale`; repeated checks while stale stay silent.
    pub fn check(&mut self, elapsed: Duration, limit: Duration) -> Option<Duration> {
        if self.state == WatchdogState::Stale || elapsed <= limit {
            return None;
        }
        self.state = WatchdogState::Stale;
        Some(elapsed)
    }
}
