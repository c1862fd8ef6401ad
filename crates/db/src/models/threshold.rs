//! `channel_thresholds` rows.

use sqlx::FromRow;
use thermogate_core::threshold::ChannelThreshold;
use thermogate_core::types::Timestamp;

#[derive(Debug, Clone, FromRow)]
pub struct ChannelThresholdRow {
    pub channel: String,
    pub enabled: bool,
    pub limit_value: f64,
    pub min_repeat_interval_secs: i64,
    pub last_alert_at: Option<Timestamp>,
}

impl From<ChannelThresholdRow> for ChannelThreshold {
    fn from(row: ChannelThresholdRow) -> Self {
        ChannelThreshold {
            channel: row.channel,
            enabled: row.enabled,
            limit: row.limit_value,
            // The column has a CHECK (>= 0).
            min_repeat_interval_secs: u64::try_from(row.min_repeat_interval_secs).unwrap_or(0),
            last_alert_at: row.last_alert_at,
        }
    }
}
