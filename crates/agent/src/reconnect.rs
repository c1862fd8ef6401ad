//! Exponential backoff between WebSocket connection attempts.
//!
//! The delay starts at [`ReconnectConfig::initial_delay`], grows by
//! [`ReconnectConfig::multiplier`] after each failed attempt and is reset
//! once a session has been established.

use std::time::Duration;

/// Tunable parameters for the backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Grow `current` by the multiplier, clamped to the maximum.
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Stateful backoff for one reconnect loop.
#[derive(Debug)]
pub struct Backoff {
    config: ReconnectConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            current: config.initial_delay,
            config,
        }
    }

    /// Delay to wait before the next attempt. Advances the backoff.
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.current;
        self.current = next_delay(self.current, &self.config);
        wait
    }

    pub fn reset(&mut self) {
        self.current = self.config.initial_delay;
    }
}
