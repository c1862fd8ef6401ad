//! Alert delivery via SMTP.
//!
//! [`EmailNotifier`] wraps the `lettre` async SMTP transport and sends one
//! plain-text email per [`AlertEvent`]. The settings live in the store and
//! are read for every alert, so edits through `/api/v1/config/email` apply
//! to the next alert without a restart. The environment only seeds the
//! store on first start; see [`email_settings_from_env`].

use std::sync::Arc;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thermogate_core::alert::{AlertContext, AlertEvent, AlertKind};
use thermogate_core::email::{EmailSettings, DEFAULT_FROM_ADDRESS, DEFAULT_SMTP_PORT};
use thermogate_db::{StoreError, TelemetryStore};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),

    /// The settings could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Seed settings
// ---------------------------------------------------------------------------

/// Settings to seed an empty store with, read from the process environment.
///
/// | Variable         | Required | Default                    |
/// |------------------|----------|----------------------------|
/// | `SMTP_HOST`      | yes      |                            |
/// | `ALERT_EMAIL_TO` | yes      |                            |
/// | `SMTP_PORT`      | no       | `587`                      |
/// | `SMTP_FROM`      | no       | `alerts@thermogate.local`  |
/// | `SMTP_USER`      | no       |                            |
/// | `SMTP_PASSWORD`  | no       |                            |
pub fn email_settings_from_env() -> Option<EmailSettings> {
    email_settings_from_lookup(|key| std::env::var(key).ok())
}

/// Seed settings through an arbitrary lookup. `None` unless both the host
/// and at least one recipient are given.
pub fn email_settings_from_lookup<F>(lookup: F) -> Option<EmailSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let smtp_host = lookup("SMTP_HOST").filter(|h| !h.trim().is_empty())?;
    let recipients: Vec<String> = lookup("ALERT_EMAIL_TO")?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if recipients.is_empty() {
        return None;
    }
    Some(EmailSettings {
        enabled: true,
        smtp_host,
        smtp_port: lookup("SMTP_PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(DEFAULT_SMTP_PORT),
        username: lookup("SMTP_USER"),
        password: lookup("SMTP_PASSWORD"),
        from_address: lookup("SMTP_FROM").unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string()),
        recipients,
    })
}

// ---------------------------------------------------------------------------
// EmailNotifier
// ---------------------------------------------------------------------------

/// What happened to one alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No settings stored, or emails switched off.
    Disabled,
}

pub struct EmailNotifier {
    store: Arc<dyn TelemetryStore>,
}

impl EmailNotifier {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    /// Consume the alert stream until it closes or `cancel` fires.
    pub async fn run(self, mut receiver: broadcast::Receiver<AlertEvent>, cancel: CancellationToken) {
        tracing::info!("Email alert notifier started");
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = receiver.recv() => next,
            };
            match next {
                Ok(alert) => match self.deliver(&alert).await {
                    Ok(Delivery::Sent) => {}
                    Ok(Delivery::Disabled) => {
                        tracing::debug!(kind = ?alert.kind, "Alert emails disabled, skipping");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, kind = ?alert.kind, "Failed to email alert");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Email notifier lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Alert stream closed");
                    break;
                }
            }
        }
        tracing::info!("Email alert notifier stopping");
    }

    /// Send one alert with the currently stored settings.
    pub async fn deliver(&self, alert: &AlertEvent) -> Result<Delivery, EmailError> {
        let settings = match self.store.email_settings().await? {
            Some(settings) if settings.enabled => settings,
            _ => return Ok(Delivery::Disabled),
        };
        let email = build_message(&settings, alert)?;
        transport(&settings)?.send(email).await?;
        tracing::info!(
            kind = ?alert.kind,
            smtp_host = %settings.smtp_host,
            recipients = settings.recipients.len(),
            "Alert email sent"
        );
        Ok(Delivery::Sent)
    }
}

fn transport(settings: &EmailSettings) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)?
        .port(settings.smtp_port);
    if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
        builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
    }
    Ok(builder.build())
}

/// The email for `alert`, addressed to every configured recipient.
pub fn build_message(settings: &EmailSettings, alert: &AlertEvent) -> Result<Message, EmailError> {
    let (subject, body) = render(alert);

    let mut builder = Message::builder()
        .from(settings.from_address.parse::<Mailbox>()?)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN);
    for to in &settings.recipients {
        builder = builder.to(to.parse::<Mailbox>()?);
    }
    builder
        .body(body)
        .map_err(|e| EmailError::Build(e.to_string()))
}

/// Subject and plain-text body for an alert.
pub fn render(alert: &AlertEvent) -> (String, String) {
    let subject = match (&alert.kind, &alert.context) {
        (AlertKind::ThresholdExceeded, AlertContext::Threshold { channel, device_id, .. }) => {
            format!("[Thermogate] {channel} over limit on {device_id}")
        }
        (AlertKind::StaleData, _) => "[Thermogate] Sensor data is stale".to_string(),
        _ => format!("[Thermogate] {}", alert.message),
    };

    let details = match &alert.context {
        AlertContext::Threshold {
            device_id,
            channel,
            value,
            limit,
        } => format!("Device: {device_id}\nChannel: {channel}\nValue: {value}\nLimit: {limit}"),
        AlertContext::Staleness {
            last_data_at,
            elapsed_ms,
            expected_interval_ms,
        } => format!(
            "Last data: {last_data_at}\nSilent for: {elapsed_ms} ms\nExpected interval: {expected_interval_ms} ms"
        ),
    };

    let body = format!("{}\nTime: {}\n\n{details}", alert.message, alert.emitted_at);
    (subject, body)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
