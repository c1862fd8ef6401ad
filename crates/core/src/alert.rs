//! Alert events emitted by the alert engine.
//!
//! Alerts are fire-and-forget: they are fanned out to consumers and to
//! in-process listeners (e.g. email) but never persisted.

use std::time::Duration;

use serde::Serialize;

use crate::threshold::ThresholdBreach;
use crate::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ThresholdExceeded,
    StaleData,
}

/// Kind-specific details, flattened into the alert envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AlertContext {
    Threshold {
        device_id: String,
        channel: String,
        value: f64,
        limit: f64,
    },
    Staleness {
        last_data_at: Timestamp,
        elapsed_ms: u64,
        expected_interval_ms: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub message: String,
    #[serde(flatten)]
    pub context: AlertContext,
    #[serde(rename = "ts")]
    pub emitted_at: Timestamp,
}

impl AlertEvent {
    pub fn threshold_exceeded(device_id: &str, breach: ThresholdBreach, now: Timestamp) -> Self {
        Self {
            kind: AlertKind::ThresholdExceeded,
            message: format!(
                "{} reading {} exceeded limit {} on {}",
                breach.channel, breach.value, breach.limit, device_id
            ),
            context: AlertContext::Threshold {
                device_id: device_id.to_string(),
                channel: breach.channel,
                value: breach.value,
                limit: breach.limit,
            },
            emitted_at: now,
        }
    }

    pub fn stale_data(
        last_data_at: Timestamp,
        elapsed: Duration,
        expected_interval: Duration,
        now: Timestamp,
    ) -> Self {
        let elapsed_ms = elapsed.as_millis() as u64;
        let expected_interval_ms = expected_interval.as_millis() as u64;
        Self {
            kind: AlertKind::StaleData,
            message: format!("No data for {elapsed_ms} ms (interval {expected_interval_ms} ms)"),
            context: AlertContext::Staleness {
                last_data_at,
                elapsed_ms,
                expected_interval_ms,
            },
            emitted_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn stale_alert_serializes_flat() {
        let now = Utc::now();
        let alert = AlertEvent::stale_data(
            now,
            Duration::from_millis(53_000),
            Duration::from_millis(5_000),
            now,
        );
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["kind"], "stale_data");
        assert_eq!(json["elapsed_ms"], 53_000);
        assert_eq!(json["expected_interval_ms"], 5_000);
        assert!(json["last_data_at"].is_string());
        assert!(json["ts"].is_string());
        assert_eq!(json["message"], "No data for 53000 ms (interval 5000 ms)");
    }

    #[test]
    fn threshold_alert_carries_channel_and_value() {
        let breach = ThresholdBreach {
            channel: "T3".into(),
            value: 45.0,
            limit: 40.0,
        };
        let alert = AlertEvent::threshold_exceeded("radix-umx201", breach, Utc::now());
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["kind"], "threshold_exceeded");
        assert_eq!(json["channel"], "T3");
        assert_eq!(json["value"], 45.0);
        assert_eq!(json["limit"], 40.0);
        assert_eq!(json["device_id"], "radix-umx201");
    }
}
