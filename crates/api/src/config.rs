use std::str::FromStr;
use std::time::Duration;

use thermogate_core::polling::PollInterval;

/// What a second retrieval trigger does while one is outstanding for the
/// same producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrentPolicy {
    /// Wait for and share the outstanding request's result.
    Join,
    /// Fail immediately with `retrieval-in-progress`.
    Reject,
}

impl FromStr for ConcurrentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "join" => Ok(Self::Join),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown retrieval policy '{other}' (expected join|reject)")),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `60`).
    pub request_timeout_secs: u64,
    /// PostgreSQL URL. When unset the in-memory store is used.
    pub database_url: Option<String>,
    /// Outbound queue depth per WebSocket subscriber (default: `256`).
    pub subscriber_queue_capacity: usize,
    /// Polling interval pushed to producers at startup (default: `5000` ms).
    pub polling_interval: PollInterval,
    /// Watchdog check cadence in seconds (default: `5`).
    pub staleness_check_secs: u64,
    /// Silence tolerated on top of the polling interval (default: `10000` ms).
    pub staleness_grace_ms: u64,
    /// Retrieval deadline in seconds (default: `30`).
    pub retrieval_timeout_secs: u64,
    /// Concurrent retrieval policy (default: `join`).
    pub retrieval_policy: ConcurrentPolicy,
    /// Interval between WebSocket pings in seconds (default: `30`).
    pub heartbeat_interval_secs: u64,
    /// Largest accepted bundle upload in bytes (default: 64 MiB).
    pub max_bundle_bytes: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                 |
    /// |-------------------------------|-------------------------|
    /// | `HOST`                        | `0.0.0.0`               |
    /// | `PORT`                        | `8000`                  |
    /// | `CORS_ORIGINS`                | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`        | `60`                    |
    /// | `DATABASE_URL`                | unset (in-memory)       |
    /// | `SUBSCRIBER_QUEUE_CAPACITY`   | `256`                   |
    /// | `POLLING_INTERVAL_MS`         | `5000`                  |
    /// | `STALENESS_CHECK_SECS`        | `5`                     |
    /// | `STALENESS_GRACE_MS`          | `10000`                 |
    /// | `RETRIEVAL_TIMEOUT_SECS`      | `30`                    |
    /// | `RETRIEVAL_CONCURRENT_POLICY` | `join`                  |
    /// | `HEARTBEAT_INTERVAL_SECS`     | `30`                    |
    /// | `MAX_BUNDLE_BYTES`            | `67108864`              |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let polling_ms: u64 = env_or("POLLING_INTERVAL_MS", 5_000);
        let polling_interval = PollInterval::from_millis(polling_ms)
            .unwrap_or_else(|e| panic!("POLLING_INTERVAL_MS: {e}"));

        let retrieval_policy: ConcurrentPolicy = std::env::var("RETRIEVAL_CONCURRENT_POLICY")
            .unwrap_or_else(|_| "join".into())
            .parse()
            .unwrap_or_else(|e| panic!("RETRIEVAL_CONCURRENT_POLICY: {e}"));

        let config = Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 60),
            database_url,
            subscriber_queue_capacity: env_or("SUBSCRIBER_QUEUE_CAPACITY", 256),
            polling_interval,
            staleness_check_secs: env_or("STALENESS_CHECK_SECS", 5),
            staleness_grace_ms: env_or("STALENESS_GRACE_MS", 10_000),
            retrieval_timeout_secs: env_or("RETRIEVAL_TIMEOUT_SECS", 30),
            retrieval_policy,
            heartbeat_interval_secs: env_or("HEARTBEAT_INTERVAL_SECS", 30),
            max_bundle_bytes: env_or("MAX_BUNDLE_BYTES", 64 * 1024 * 1024),
        };
        if let Err(e) = config.validate() {
            panic!("Invalid configuration: {e}");
        }
        config
    }

    /// Cross-field checks that individual parsing cannot catch.
    pub fn validate(&self) -> Result<(), String> {
        if self.staleness_check_secs == 0 {
            return Err("STALENESS_CHECK_SECS must be at least 1".into());
        }
        if self.heartbeat_interval_secs == 0 {
            return Err("HEARTBEAT_INTERVAL_SECS must be at least 1".into());
        }
        if self.retrieval_timeout_secs == 0 {
            return Err("RETRIEVAL_TIMEOUT_SECS must be at least 1".into());
        }
        // A retrieval must be able to report its own timeout before the HTTP
        // layer cuts the request off.
        if self.request_timeout_secs <= self.retrieval_timeout_secs {
            return Err(format!(
                "REQUEST_TIMEOUT_SECS ({}) must exceed RETRIEVAL_TIMEOUT_SECS ({})",
                self.request_timeout_secs, self.retrieval_timeout_secs
            ));
        }
        Ok(())
    }

    pub fn staleness_grace(&self) -> Duration {
        Duration::from_millis(self.staleness_grace_ms)
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }
}

/// Parse an optional numeric env var, panicking on garbage.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid number: {e}")),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: vec![],
            request_timeout_secs: 60,
            database_url: None,
            subscriber_queue_capacity: 16,
            polling_interval: PollInterval::default(),
            staleness_check_secs: 5,
            staleness_grace_ms: 10_000,
            retrieval_timeout_secs: 30,
            retrieval_policy: ConcurrentPolicy::Join,
            heartbeat_interval_secs: 30,
            max_bundle_bytes: 1024,
        }
    }

    #[test]
    fn defaults_validate() {
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn request_timeout_must_outlast_retrieval_timeout() {
        let mut config = valid();
        config.request_timeout_secs = 30;
        assert!(config.validate().unwrap_err().contains("REQUEST_TIMEOUT_SECS"));
        config.request_timeout_secs = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut config = valid();
        config.staleness_check_secs = 0;
        assert!(config.validate().unwrap_err().contains("STALENESS_CHECK_SECS"));

        let mut config = valid();
        config.heartbeat_interval_secs = 0;
        assert!(config.validate().unwrap_err().contains("HEARTBEAT_INTERVAL_SECS"));
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Join".parse::<ConcurrentPolicy>(), Ok(ConcurrentPolicy::Join));
        assert_eq!(" reject ".parse::<ConcurrentPolicy>(), Ok(ConcurrentPolicy::Reject));
        assert!("queue".parse::<ConcurrentPolicy>().is_err());
    }
}
