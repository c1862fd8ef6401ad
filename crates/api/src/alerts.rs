//! Alert engine: per-channel threshold evaluation and the device-wide
//! staleness state.
//!
//! The engine is plugged into the hub as a [`MeasurementObserver`]. Every
//! published measurement refreshes the staleness clock and is evaluated
//! against the live threshold table. The periodic staleness check is driven
//! from outside by [`crate::background::staleness_watchdog`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use thermogate_core::alert::AlertEvent;
use thermogate_core::measurement::Measurement;
use thermogate_core::staleness::{StalenessMonitor, StalenessPolicy, WatchdogState};
use thermogate_core::threshold::{ChannelThreshold, ThresholdState, ThresholdUpdate};
use thermogate_core::types::Timestamp;
use thermogate_db::{StoreError, TelemetryStore};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::error::AppError;
use crate::hub::MeasurementObserver;

/// A threshold as reported to configuration readers.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdView {
    #[serde(flatten)]
    pub threshold: ChannelThreshold,
    pub state: ThresholdState,
}

/// Staleness clock and watchdog state, kept behind one lock so a check
/// never judges a clock that a concurrent measurement has already reset.
///
/// The clock starts at process start so the watchdog fires even when no
/// measurement ever arrives.
#[derive(Debug)]
struct Staleness {
    /// Monotonic instant of the last measurement (or start).
    since: Instant,
    started_at: Timestamp,
    last_measurement_at: Option<Timestamp>,
    monitor: StalenessMonitor,
}

impl Staleness {
    /// Wall-clock time reported as "last data" in stale alerts.
    fn last_data_at(&self) -> Timestamp {
        self.last_measurement_at.unwrap_or(self.started_at)
    }
}

pub struct AlertEngine {
    /// One lock per channel so evaluations of unrelated channels never
    /// contend and evaluations of the same channel are serialized.
    thresholds: RwLock<HashMap<String, Arc<Mutex<ChannelThreshold>>>>,
    store: Arc<dyn TelemetryStore>,
    policy: StalenessPolicy,
    staleness: StdMutex<Staleness>,
}

impl AlertEngine {
    pub fn new(store: Arc<dyn TelemetryStore>, policy: StalenessPolicy) -> Self {
        Self {
            thresholds: RwLock::new(HashMap::new()),
            store,
            policy,
            staleness: StdMutex::new(Staleness {
                since: Instant::now(),
                started_at: Utc::now(),
                last_measurement_at: None,
                monitor: StalenessMonitor::new(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Threshold configuration
    // -----------------------------------------------------------------------

    /// Replace the live table with the store's persisted thresholds.
    pub async fn load_thresholds(&self) -> Result<usize, StoreError> {
        let stored = self.store.list_thresholds().await?;
        let count = stored.len();
        let mut table = self.thresholds.write().await;
        table.clear();
        for t in stored {
            table.insert(t.channel.clone(), Arc::new(Mutex::new(t)));
        }
        tracing::info!(count, "Loaded channel thresholds");
        Ok(count)
    }

    /// Current thresholds, sorted by channel.
    pub async fn thresholds(&self) -> Vec<ThresholdView> {
        let now = Utc::now();
        let channels: Vec<_> = self.thresholds.read().await.values().cloned().collect();
        let mut views = Vec::with_capacity(channels.len());
        for channel in channels {
            let threshold = channel.lock().await.clone();
            views.push(ThresholdView {
                state: threshold.state_at(now),
                threshold,
            });
        }
        views.sort_by(|a, b| a.threshold.channel.cmp(&b.threshold.channel));
        views
    }

    /// Validate, persist, then apply a configuration write.
    ///
    /// A rejected write leaves both the store and the live table untouched.
    /// The channel's firing history is preserved.
    pub async fn upsert_threshold(&self, update: &ThresholdUpdate) -> Result<ThresholdView, AppError> {
        let candidate = ChannelThreshold::from_update(update)?;
        let stored = self.store.upsert_threshold(&candidate).await?;

        let (slot, existed) = {
            let mut table = self.thresholds.write().await;
            match table.get(&stored.channel) {
                Some(slot) => (Arc::clone(slot), true),
                None => {
                    let slot = Arc::new(Mutex::new(stored.clone()));
                    table.insert(stored.channel.clone(), Arc::clone(&slot));
                    (slot, false)
                }
            }
        };
        let threshold = {
            let mut live = slot.lock().await;
            if existed {
                live.apply(update)?;
            }
            live.clone()
        };
        tracing::info!(
            channel = %threshold.channel,
            enabled = threshold.enabled,
            limit = threshold.limit,
            repeat_secs = threshold.min_repeat_interval_secs,
            "Threshold updated"
        );
        Ok(ThresholdView {
            state: threshold.state_at(Utc::now()),
            threshold,
        })
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Evaluate every reading of `measurement` as of `now`.
    ///
    /// Channels without configuration are ignored. Firing updates the live
    /// `last_alert_at` under the channel lock; the store copy is written
    /// after the lock is released.
    pub async fn evaluate_at(&self, measurement: &Measurement, now: Timestamp) -> Vec<AlertEvent> {
        let mut alerts = Vec::new();
        for (channel, value) in measurement.readings() {
            let Some(slot) = self.thresholds.read().await.get(channel).cloned() else {
                continue;
            };
            let breach = slot.lock().await.evaluate(value, now);
            let Some(breach) = breach else {
                continue;
            };
            if let Err(e) = self.store.record_alert(channel, now).await {
                tracing::warn!(channel, error = %e, "Failed to persist last_alert_at");
            }
            alerts.push(AlertEvent::threshold_exceeded(
                measurement.device_id(),
                breach,
                now,
            ));
        }
        alerts
    }

    fn staleness(&self) -> MutexGuard<'_, Staleness> {
        self.staleness.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Note that data arrived. Clears a stale state.
    pub fn record_measurement(&self, wall: Timestamp) {
        let recovered = {
            let mut staleness = self.staleness();
            staleness.since = Instant::now();
            staleness.last_measurement_at = Some(wall);
            staleness.monitor.record_measurement()
        };
        if recovered {
            tracing::info!("Data flow resumed, watchdog healthy");
        }
    }

    /// One watchdog tick. Returns an alert only on the transition into
    /// the stale state.
    pub fn check_staleness(&self, expected_interval: Duration) -> Option<AlertEvent> {
        let limit = self.policy.limit_for(expected_interval);
        let (stale_for, last_data_at) = {
            let mut staleness = self.staleness();
            let elapsed = staleness.since.elapsed();
            let stale_for = staleness.monitor.check(elapsed, limit)?;
            (stale_for, staleness.last_data_at())
        };
        Some(AlertEvent::stale_data(
            last_data_at,
            stale_for,
            expected_interval,
            Utc::now(),
        ))
    }

    pub fn watchdog_state(&self) -> WatchdogState {
        self.staleness().monitor.state()
    }

    /// Wall-clock time of the last measurement, `None` before the first.
    pub fn last_measurement_at(&self) -> Option<Timestamp> {
        self.staleness().last_measurement_at
    }
}

#[async_trait]
impl MeasurementObserver for AlertEngine {
    async fn observe(&self, measurement: &Measurement) -> Vec<AlertEvent> {
        let now = Utc::now();
        self.record_measurement(now);
        self.evaluate_at(measurement, now).await
    }
}
