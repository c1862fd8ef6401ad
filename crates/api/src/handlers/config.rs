//! Runtime configuration: channel thresholds, the polling interval and the
//! alert email settings.
//!
//! Writes are validated before anything changes; a rejected write leaves
//! the previous configuration in effect.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use thermogate_core::email::EmailSettings;
use thermogate_core::error::CoreError;
use thermogate_core::polling::PollInterval;
use thermogate_core::threshold::ThresholdUpdate;

use crate::alerts::ThresholdView;
use crate::error::AppResult;
use crate::response::{data, DataResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PollingSettings {
    pub interval_ms: u64,
    /// Silence after which the watchdog reports stale data.
    pub staleness_limit_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct PollingUpdate {
    pub interval_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct PollingUpdated {
    #[serde(flatten)]
    pub settings: PollingSettings,
    /// Producers the `set_interval` command reached.
    pub producers_notified: usize,
}

fn polling_settings(state: &AppState, interval: PollInterval) -> PollingSettings {
    PollingSettings {
        interval_ms: interval.as_millis(),
        staleness_limit_ms: (interval.as_duration() + state.config.staleness_grace()).as_millis()
            as u64,
    }
}

/// GET /api/v1/config/thresholds
pub async fn list_thresholds(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<ThresholdView>>>> {
    Ok(data(state.alerts.thresholds().await))
}

/// PUT /api/v1/config/thresholds
///
/// Create or reconfigure one channel. Its firing history is kept.
pub async fn upsert_threshold(
    State(state): State<AppState>,
    Json(input): Json<ThresholdUpdate>,
) -> AppResult<Json<DataResponse<ThresholdView>>> {
    let view = state.alerts.upsert_threshold(&input).await?;
    Ok(data(view))
}

/// GET /api/v1/config/polling
pub async fn get_polling(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<PollingSettings>>> {
    let settings = polling_settings(&state, state.polling.current());
    Ok(data(settings))
}

/// PUT /api/v1/config/polling
///
/// Producers pick the new interval up at the start of their next cycle.
pub async fn set_polling(
    State(state): State<AppState>,
    Json(input): Json<PollingUpdate>,
) -> AppResult<Json<DataResponse<PollingUpdated>>> {
    let interval = PollInterval::from_millis(input.interval_ms)?;
    let producers_notified = state.polling.set(interval, &state.hub).await;
    Ok(data(PollingUpdated {
        settings: polling_settings(&state, interval),
        producers_notified,
    }))
}

/// GET /api/v1/config/email
///
/// The password, if any, comes back masked.
pub async fn get_email(State(state): State<AppState>) -> AppResult<Json<DataResponse<EmailSettings>>> {
    let settings = state
        .store
        .email_settings()
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "email configuration",
            key: "current".to_string(),
        })?;
    Ok(data(settings.redacted()))
}

/// PUT /api/v1/config/email
///
/// Replaces the settings. Sending the masked password back keeps the
/// stored one. The notifier uses the new settings from the next alert on.
pub async fn put_email(
    State(state): State<AppState>,
    Json(input): Json<EmailSettings>,
) -> AppResult<Json<DataResponse<EmailSettings>>> {
    let stored = state.store.email_settings().await?;
    let settings = input.keep_password_from(stored.as_ref());
    settings.validate()?;
    let saved = state.store.save_email_settings(&settings).await?;
    tracing::info!(
        enabled = saved.enabled,
        smtp_host = %saved.smtp_host,
        recipients = saved.recipients.len(),
        "Alert email settings updated"
    );
    Ok(data(saved.redacted()))
}
