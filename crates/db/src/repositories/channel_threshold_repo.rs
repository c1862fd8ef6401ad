//! Repository for the `channel_thresholds` table.

use sqlx::PgPool;
use thermogate_core::threshold::ChannelThreshold;
use thermogate_core::types::Timestamp;

use crate::models::threshold::ChannelThresholdRow;

const COLUMNS: &str = "channel, enabled, limit_value, min_repeat_interval_secs, last_alert_at";

/// Provides query operations for per-channel alert thresholds.
pub struct ChannelThresholdRepo;

impl ChannelThresholdRepo {
    pub async fn list_all(pool: &PgPool) -> Result<Vec<ChannelThresholdRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM channel_thresholds ORDER BY channel");
        sqlx::query_as::<_, ChannelThresholdRow>(&query)
            .fetch_all(pool)
            .await
    }

    /// Insert or update a channel's configuration.
    ///
    /// On conflict only the configuration columns change; `last_alert_at`
    /// belongs to the alert engine and is left as stored.
    pub async fn upsert(
        pool: &PgPool,
        threshold: &ChannelThreshold,
    ) -> Result<ChannelThresholdRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO channel_thresholds \
                (channel, enabled, limit_value, min_repeat_interval_secs, last_alert_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (channel) DO UPDATE SET \
                enabled = EXCLUDED.enabled, \
                limit_value = EXCLUDED.limit_value, \
                min_repeat_interval_secs = EXCLUDED.min_repeat_interval_secs, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ChannelThresholdRow>(&query)
            .bind(&threshold.channel)
            .bind(threshold.enabled)
            .bind(threshold.limit)
            .bind(i64::try_from(threshold.min_repeat_interval_secs).unwrap_or(i64::MAX))
            .bind(threshold.last_alert_at)
            .fetch_one(pool)
            .await
    }

    /// Record a firing. Returns `false` if the channel is not configured.
    pub async fn set_last_alert(
        pool: &PgPool,
        channel: &str,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE channel_thresholds SET last_alert_at = $2 WHERE channel = $1")
                .bind(channel)
                .bind(at)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }
}
