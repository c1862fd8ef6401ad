//! Alert email settings, editable at runtime and persisted by the store.
//!
//! The SMTP password is write-only over the API: reads return
//! [`MASKED_PASSWORD`] in its place, and a write that sends the mask back
//! keeps the stored password.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Placeholder returned instead of a stored password.
pub const MASKED_PASSWORD: &str = "********";

/// Default SMTP submission port (STARTTLS).
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Sender used when none is configured.
pub const DEFAULT_FROM_ADDRESS: &str = "alerts@thermogate.local";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSettings {
    /// Alerts are only mailed while this is set.
    pub enabled: bool,
    pub smtp_host: String,
    #[serde(default = "default_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_from")]
    pub from_address: String,
    pub recipients: Vec<String>,
}

fn default_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_from() -> String {
    DEFAULT_FROM_ADDRESS.to_string()
}

impl EmailSettings {
    /// Reject settings that could never deliver. Disabled settings may be
    /// incomplete so an operator can stage them.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.smtp_port == 0 {
            return Err(CoreError::Validation("smtp_port must be non-zero".to_string()));
        }
        if let Some(bad) = self.recipients.iter().find(|r| !r.contains('@')) {
            return Err(CoreError::Validation(format!("recipient '{bad}' is not an email address")));
        }
        if !self.from_address.contains('@') {
            return Err(CoreError::Validation("from_address is not an email address".to_string()));
        }
        if self.enabled {
            if self.smtp_host.trim().is_empty() {
                return Err(CoreError::Validation("smtp_host is required".to_string()));
            }
            if self.recipients.is_empty() {
                return Err(CoreError::Validation(
                    "at least one recipient is required".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Copy with the password replaced by [`MASKED_PASSWORD`].
    pub fn redacted(&self) -> Self {
        Self {
            password: self.password.as_ref().map(|_| MASKED_PASSWORD.to_string()),
            ..self.clone()
        }
    }

    /// Resolve a masked password against the currently stored settings.
    pub fn keep_password_from(mut self, stored: Option<&EmailSettings>) -> Self {
        if self.password.as_deref() == Some(MASKED_PASSWORD) {
            self.password = stored.and_then(|s| s.password.clone());
        }
        self
    }
}
