//! In-process [`TelemetryStore`] for running without PostgreSQL and for tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thermogate_core::email::EmailSettings;
use thermogate_core::measurement::Measurement;
use thermogate_core::threshold::ChannelThreshold;
use thermogate_core::types::Timestamp;
use tokio::sync::RwLock;

use super::{StoreError, TelemetryStore};
use crate::models::measurement::{DeleteScope, MeasurementFilter, StoredMeasurement};

#[derive(Default)]
struct Inner {
    next_id: i64,
    /// Kept in insertion order.
    measurements: Vec<StoredMeasurement>,
    thresholds: BTreeMap<String, ChannelThreshold>,
    email: Option<EmailSettings>,
}

/// Volatile store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryTelemetryStore {
    inner: RwLock<Inner>,
}

impl MemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TelemetryStore for MemoryTelemetryStore {
    async fn insert_measurement(
        &self,
        measurement: &Measurement,
        received_at: Timestamp,
    ) -> Result<StoredMeasurement, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let stored = StoredMeasurement {
            id: inner.next_id,
            device_id: measurement.device_id().to_string(),
            payload: measurement.clone(),
            received_at,
        };
        inner.measurements.push(stored.clone());
        Ok(stored)
    }

    async fn list_measurements(
        &self,
        filter: &MeasurementFilter,
    ) -> Result<Vec<StoredMeasurement>, StoreError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<&StoredMeasurement> = inner
            .measurements
            .iter()
            .filter(|m| filter.matches(&m.device_id, m.received_at))
            .collect();
        rows.sort_by(|a, b| b.received_at.cmp(&a.received_at).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .cloned()
            .collect())
    }

    async fn count_measurements(&self) -> Result<i64, StoreError> {
        Ok(self.inner.read().await.measurements.len() as i64)
    }

    async fn delete_measurements(&self, scope: DeleteScope) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.measurements.len();
        match scope {
            DeleteScope::Oldest(n) => {
                let n = (n.max(0) as usize).min(before);
                inner.measurements.sort_by_key(|m| (m.received_at, m.id));
                inner.measurements.drain(..n);
            }
            DeleteScope::Between { start, end } => {
                inner
                    .measurements
                    .retain(|m| m.received_at < start || m.received_at > end);
            }
        }
        Ok((before - inner.measurements.len()) as u64)
    }

    async fn list_thresholds(&self) -> Result<Vec<ChannelThreshold>, StoreError> {
        Ok(self.inner.read().await.thresholds.values().cloned().collect())
    }

    async fn upsert_threshold(
        &self,
        threshold: &ChannelThreshold,
    ) -> Result<ChannelThreshold, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .thresholds
            .entry(threshold.channel.clone())
            .and_modify(|t| {
                t.enabled = threshold.enabled;
                t.limit = threshold.limit;
                t.min_repeat_interval_secs = threshold.min_repeat_interval_secs;
            })
            .or_insert_with(|| threshold.clone());
        Ok(stored.clone())
    }

    async fn record_alert(&self, channel: &str, at: Timestamp) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let threshold = inner
            .thresholds
            .get_mut(channel)
            .ok_or_else(|| StoreError::UnknownChannel(channel.to_string()))?;
        threshold.last_alert_at = Some(at);
        Ok(())
    }

    async fn email_settings(&self) -> Result<Option<EmailSettings>, StoreError> {
        Ok(self.inner.read().await.email.clone())
    }

    async fn save_email_settings(
        &self,
        settings: &EmailSettings,
    ) -> Result<EmailSettings, StoreError> {
        self.inner.write().await.email = Some(settings.clone());
        Ok(settings.clone())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
