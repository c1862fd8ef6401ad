//! [`TelemetryStore`] backed by PostgreSQL.

use async_trait::async_trait;
use thermogate_core::email::EmailSettings;
use thermogate_core::measurement::Measurement;
use thermogate_core::threshold::ChannelThreshold;
use thermogate_core::types::Timestamp;

use super::{StoreError, TelemetryStore};
use crate::models::measurement::{DeleteScope, MeasurementFilter, StoredMeasurement};
use crate::repositories::{ChannelThresholdRepo, EmailConfigRepo, MeasurementRepo};
use crate::DbPool;

#[derive(Clone)]
pub struct PgTelemetryStore {
    pool: DbPool,
}

impl PgTelemetryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TelemetryStore for PgTelemetryStore {
    async fn insert_measurement(
        &self,
        measurement: &Measurement,
        received_at: Timestamp,
    ) -> Result<StoredMeasurement, StoreError> {
        let row = MeasurementRepo::insert(&self.pool, measurement, received_at).await?;
        Ok(row.into())
    }

    async fn list_measurements(
        &self,
        filter: &MeasurementFilter,
    ) -> Result<Vec<StoredMeasurement>, StoreError> {
        let rows = MeasurementRepo::list(&self.pool, filter).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_measurements(&self) -> Result<i64, StoreError> {
        Ok(MeasurementRepo::count(&self.pool).await?)
    }

    async fn delete_measurements(&self, scope: DeleteScope) -> Result<u64, StoreError> {
        Ok(MeasurementRepo::delete(&self.pool, scope).await?)
    }

    async fn list_thresholds(&self) -> Result<Vec<ChannelThreshold>, StoreError> {
        let rows = ChannelThresholdRepo::list_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert_threshold(
        &self,
        threshold: &ChannelThreshold,
    ) -> Result<ChannelThreshold, StoreError> {
        let row = ChannelThresholdRepo::upsert(&self.pool, threshold).await?;
        Ok(row.into())
    }

    async fn record_alert(&self, channel: &str, at: Timestamp) -> Result<(), StoreError> {
        if ChannelThresholdRepo::set_last_alert(&self.pool, channel, at).await? {
            Ok(())
        } else {
            Err(StoreError::UnknownChannel(channel.to_string()))
        }
    }

    async fn email_settings(&self) -> Result<Option<EmailSettings>, StoreError> {
        Ok(EmailConfigRepo::get(&self.pool).await?.map(Into::into))
    }

    async fn save_email_settings(
        &self,
        settings: &EmailSettings,
    ) -> Result<EmailSettings, StoreError> {
        Ok(EmailConfigRepo::upsert(&self.pool, settings).await?.into())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(crate::health_check(&self.pool).await?)
    }
}
