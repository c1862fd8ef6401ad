//! The storage seam used by the pipeline.

use async_trait::async_trait;
use thermogate_core::email::EmailSettings;
use thermogate_core::measurement::Measurement;
use thermogate_core::threshold::ChannelThreshold;
use thermogate_core::types::Timestamp;

use crate::models::measurement::{DeleteScope, MeasurementFilter, StoredMeasurement};

pub mod memory;
pub mod postgres;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unknown channel '{0}'")]
    UnknownChannel(String),
}

/// Measurement history plus the persisted threshold and email configuration.
///
/// Implementations must be safe to call concurrently from every
/// connection task.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn insert_measurement(
        &self,
        measurement: &Measurement,
        received_at: Timestamp,
    ) -> Result<StoredMeasurement, StoreError>;

    async fn list_measurements(
        &self,
        filter: &MeasurementFilter,
    ) -> Result<Vec<StoredMeasurement>, StoreError>;

    async fn count_measurements(&self) -> Result<i64, StoreError>;

    /// Returns the number of rows removed.
    async fn delete_measurements(&self, scope: DeleteScope) -> Result<u64, StoreError>;

    async fn list_thresholds(&self) -> Result<Vec<ChannelThreshold>, StoreError>;

    /// Create or reconfigure a channel, preserving any stored `last_alert_at`.
    async fn upsert_threshold(
        &self,
        threshold: &ChannelThreshold,
    ) -> Result<ChannelThreshold, StoreError>;

    async fn record_alert(&self, channel: &str, at: Timestamp) -> Result<(), StoreError>;

    /// `None` until settings are first saved.
    async fn email_settings(&self) -> Result<Option<EmailSettings>, StoreError>;

    async fn save_email_settings(
        &self,
        settings: &EmailSettings,
    ) -> Result<EmailSettings, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
