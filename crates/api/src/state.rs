use std::sync::Arc;

use thermogate_core::email::EmailSettings;
use thermogate_core::protocol::HealthSnapshot;
use thermogate_core::staleness::StalenessPolicy;
use thermogate_core::threshold::default_thresholds;
use thermogate_db::{StoreError, TelemetryStore};

use crate::alerts::AlertEngine;
use crate::config::ServerConfig;
use crate::hub::{Hub, Role};
use crate::polling::PollingControl;
use crate::retrieval::RetrievalOrchestrator;

/// Channels seeded when the store holds no thresholds yet.
const DEFAULT_CHANNEL_PREFIX: &str = "T";
const DEFAULT_CHANNEL_COUNT: u16 = 8;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; every component is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Measurement history and persisted thresholds.
    pub store: Arc<dyn TelemetryStore>,
    /// Subscriber registry and fan-out.
    pub hub: Arc<Hub>,
    pub alerts: Arc<AlertEngine>,
    pub retrieval: Arc<RetrievalOrchestrator>,
    pub polling: Arc<PollingControl>,
}

impl AppState {
    /// Build and wire every pipeline component.
    ///
    /// The alert engine observes the hub's publish path and the retrieval
    /// orchestrator listens for producer disconnects.
    pub fn new(config: ServerConfig, store: Arc<dyn TelemetryStore>) -> Self {
        let hub = Arc::new(Hub::new(
            Arc::clone(&store),
            config.subscriber_queue_capacity,
        ));

        let alerts = Arc::new(AlertEngine::new(
            Arc::clone(&store),
            StalenessPolicy {
                grace: config.staleness_grace(),
            },
        ));
        hub.add_observer(alerts.clone());

        let retrieval = Arc::new(RetrievalOrchestrator::new(
            Arc::clone(&hub),
            config.retrieval_policy,
            config.retrieval_timeout(),
        ));
        let listener = Arc::downgrade(&retrieval);
        hub.add_disconnect_listener(listener);

        let polling = Arc::new(PollingControl::new(config.polling_interval));

        Self {
            config: Arc::new(config),
            store,
            hub,
            alerts,
            retrieval,
            polling,
        }
    }

    /// Seed `T1..T8` defaults into an empty store, then load the live
    /// threshold table. Existing configuration is never overwritten.
    pub async fn seed_default_thresholds(&self) -> Result<usize, StoreError> {
        if self.store.list_thresholds().await?.is_empty() {
            for threshold in default_thresholds(DEFAULT_CHANNEL_PREFIX, DEFAULT_CHANNEL_COUNT) {
                self.store.upsert_threshold(&threshold).await?;
            }
            tracing::info!(
                count = DEFAULT_CHANNEL_COUNT,
                "Seeded default channel thresholds"
            );
        }
        self.alerts.load_thresholds().await
    }

    /// Store `seed` as the email settings unless some are already saved.
    /// Returns whether the seed was written.
    pub async fn seed_email_settings(&self, seed: Option<EmailSettings>) -> Result<bool, StoreError> {
        let Some(seed) = seed else {
            return Ok(false);
        };
        if self.store.email_settings().await?.is_some() {
            return Ok(false);
        }
        self.store.save_email_settings(&seed).await?;
        tracing::info!(
            smtp_host = %seed.smtp_host,
            recipients = seed.recipients.len(),
            "Seeded alert email settings from the environment"
        );
        Ok(true)
    }

    pub async fn health_snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            last_measurement_at: self.alerts.last_measurement_at(),
            watchdog: self.alerts.watchdog_state(),
            connected_producers: self.hub.count(Role::Producer).await,
            connected_consumers: self.hub.count(Role::Consumer).await,
        }
    }
}
