//! The `email_config` row.

use sqlx::FromRow;
use thermogate_core::email::{EmailSettings, DEFAULT_SMTP_PORT};

#[derive(Debug, Clone, FromRow)]
pub struct EmailConfigRow {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: i32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub recipients: Vec<String>,
}

impl From<EmailConfigRow> for EmailSettings {
    fn from(row: EmailConfigRow) -> Self {
        EmailSettings {
            enabled: row.enabled,
            smtp_host: row.smtp_host,
            // The column has a CHECK (1..=65535).
            smtp_port: u16::try_from(row.smtp_port).unwrap_or(DEFAULT_SMTP_PORT),
            username: row.username,
            password: row.password,
            from_address: row.from_address,
            recipients: row.recipients,
        }
    }
}
