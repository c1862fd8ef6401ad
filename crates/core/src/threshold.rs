//! Per-channel threshold configuration and evaluation.
//!
//! Pure logic, no I/O. The alert engine owns the live [`ChannelThreshold`]
//! values and calls [`ChannelThreshold::evaluate`] for every reading; the
//! configuration store only ever writes through [`ChannelThreshold::apply`],
//! which leaves `last_alert_at` untouched.
//!
//! Re-arming is time based: every over-limit sample is judged on its own
//! against `min_repeat_interval`. There is no "back below the limit" reset.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Repeat interval applied when a configuration write omits it.
pub const DEFAULT_MIN_REPEAT_INTERVAL_SECS: u64 = 300;

/// Limit seeded for every channel on first start.
pub const DEFAULT_LIMIT: f64 = 35.0;

/// Alert configuration and firing history for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelThreshold {
    pub channel: String,
    pub enabled: bool,
    /// Strict upper bound; `value > limit` fires, `value == limit` does not.
    pub limit: f64,
    pub min_repeat_interval_secs: u64,
    /// Last time this channel fired. Written only by the alert engine.
    pub last_alert_at: Option<Timestamp>,
}

/// Whether a channel is currently inside its repeat-suppression window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdState {
    Normal,
    Alerting,
}

/// A reading that crossed its channel limit and was allowed to fire.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdBreach {
    pub channel: String,
    pub value: f64,
    pub limit: f64,
}

/// A configuration write for one channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdUpdate {
    pub channel: String,
    pub enabled: bool,
    pub limit: f64,
    #[serde(default = "default_repeat_secs", alias = "alert_interval_sec")]
    pub min_repeat_interval_secs: u64,
}

fn default_repeat_secs() -> u64 {
    DEFAULT_MIN_REPEAT_INTERVAL_SECS
}

impl ThresholdUpdate {
    /// Reject malformed writes before they reach the live configuration.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.channel.trim().is_empty() {
            return Err(CoreError::Validation("channel is required".to_string()));
        }
        if !self.limit.is_finite() {
            return Err(CoreError::Validation(format!(
                "limit for {} must be a finite number",
                self.channel
            )));
        }
        Ok(())
    }
}

impl ChannelThreshold {
    /// A fresh threshold that has never fired.
    pub fn new(channel: impl Into<String>, enabled: bool, limit: f64, repeat_secs: u64) -> Self {
        Self {
            channel: channel.into(),
            enabled,
            limit,
            min_repeat_interval_secs: repeat_secs,
            last_alert_at: None,
        }
    }

    /// Build from a validated update.
    pub fn from_update(update: &ThresholdUpdate) -> Result<Self, CoreError> {
        update.validate()?;
        Ok(Self::new(
            update.channel.trim(),
            update.enabled,
            update.limit,
            update.min_repeat_interval_secs,
        ))
    }

    /// Apply a configuration write, keeping the firing history.
    pub fn apply(&mut self, update: &ThresholdUpdate) -> Result<(), CoreError> {
        update.validate()?;
        self.enabled = update.enabled;
        self.limit = update.limit;
        self.min_repeat_interval_secs = update.min_repeat_interval_secs;
        Ok(())
    }

    pub fn min_repeat_interval(&self) -> Duration {
        Duration::from_secs(self.min_repeat_interval_secs)
    }

    /// Whether a repeat interval has elapsed since the last firing.
    fn rearmed(&self, now: Timestamp) -> bool {
        match self.last_alert_at {
            None => true,
            Some(last) => match (now - last).to_std() {
                Ok(elapsed) => elapsed >= self.min_repeat_interval(),
                // `now` before the last firing: clock went backwards, stay quiet.
                Err(_) => false,
            },
        }
    }

    pub fn state_at(&self, now: Timestamp) -> ThresholdState {
        if self.last_alert_at.is_some() && !self.rearmed(now) {
            ThresholdState::Alerting
        } else {
            ThresholdState::Normal
        }
    }

    /// Judge one reading. On firing, records `now` as `last_alert_at`.
    pub fn evaluate(&mut self, value: f64, now: Timestamp) -> Option<ThresholdBreach> {
        if !self.enabled || value.is_nan() || value <= self.limit || !self.rearmed(now) {
            return None;
        }
        self.last_alert_at = Some(now);
        Some(ThresholdBreach {
            channel: self.channel.clone(),
            value,
            limit: self.limit,
        })
    }
}

/// Seed configuration: `{prefix}1..={prefix}{count}`, enabled, default limit.
pub fn default_thresholds(prefix: &str, count: u16) -> Vec<ChannelThreshold> {
    crate::registers::channel_labels(prefix, count)
        .into_iter()
        .map(|ch| ChannelThreshold::new(ch, true, DEFAULT_LIMIT, DEFAULT_MIN_REPEAT_INTERVAL_SECS))
        .collect()
}
