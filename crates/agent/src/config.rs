use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thermogate_core::polling::{PollInterval, DEFAULT_POLL_INTERVAL_MS};
use thermogate_core::registers::{RegisterBlock, DEFAULT_SCALE_DIVISOR};

use crate::bundle::{BundleSource, FtpSettings};
use crate::error::AgentError;

const DEFAULT_DEVICE_ID: &str = "radix-umx201";
const DEFAULT_MODBUS_PORT: u16 = 502;
const DEFAULT_UNIT_ID: u8 = 1;
const DEFAULT_MODBUS_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_REGISTER_COUNT: u16 = 8;
const DEFAULT_OUTBOX_CAPACITY: usize = 64;
const DEFAULT_FTP_PORT: u16 = 21;
const DEFAULT_FTP_USER: &str = "anonymous";
const DEFAULT_FTP_TIMEOUT_MS: u64 = 10_000;

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Producer WebSocket endpoint, e.g. `ws://host:8000/api/v1/ws/producer`.
    pub ws_url: String,
    /// Backend HTTP base URL for bundle uploads, e.g. `http://host:8000`.
    pub http_url: Option<String>,
    pub device_id: String,
    pub modbus_host: String,
    pub modbus_port: u16,
    pub unit_id: u8,
    pub modbus_timeout: Duration,
    pub block: RegisterBlock,
    pub scale_divisor: f64,
    pub channel_prefix: String,
    /// Initial polling interval; the backend may change it at runtime.
    pub poll_interval: PollInterval,
    /// Device FTP server when `FTP_HOST` is set, else `BUNDLE_SOURCE_DIR`.
    pub bundle_source: Option<BundleSource>,
    pub outbox_capacity: usize,
}

impl AgentConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var             | Required | Default        |
    /// |---------------------|----------|----------------|
    /// | `BACKEND_WS_URL`    | yes      | --             |
    /// | `BACKEND_HTTP_URL`  | no       | --             |
    /// | `DEVICE_ID`         | no       | `radix-umx201` |
    /// | `MODBUS_HOST`       | yes      | --             |
    /// | `MODBUS_PORT`       | no       | `502`          |
    /// | `MODBUS_UNIT_ID`    | no       | `1`            |
    /// | `MODBUS_TIMEOUT_MS` | no       | `3000`         |
    /// | `REGISTER_START`    | no       | `0`            |
    /// | `REGISTER_COUNT`    | no       | `8`            |
    /// | `SCALE_DIVISOR`     | no       | `10`           |
    /// | `CHANNEL_PREFIX`    | no       | `T`            |
    /// | `POLL_INTERVAL_MS`  | no       | `5000`         |
    /// | `FTP_HOST`          | no       | --             |
    /// | `FTP_PORT`          | no       | `21`           |
    /// | `FTP_USER`          | no       | `anonymous`    |
    /// | `FTP_PASSWORD`      | no       | empty          |
    /// | `FTP_DIR`           | no       | login dir      |
    /// | `FTP_TIMEOUT_MS`    | no       | `10000`        |
    /// | `BUNDLE_SOURCE_DIR` | no       | --             |
    /// | `OUTBOX_CAPACITY`   | no       | `64`           |
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| AgentError::Config(format!("{key} is required")))
        };

        let start = parse_or(get("REGISTER_START"), "REGISTER_START", 0u16)?;
        let count = parse_or(get("REGISTER_COUNT"), "REGISTER_COUNT", DEFAULT_REGISTER_COUNT)?;
        let block = RegisterBlock::new(start, count)
            .map_err(|e| AgentError::Config(e.to_string()))?;

        let scale_divisor = parse_or(get("SCALE_DIVISOR"), "SCALE_DIVISOR", DEFAULT_SCALE_DIVISOR)?;
        if !scale_divisor.is_finite() || scale_divisor == 0.0 {
            return Err(AgentError::Config(
                "SCALE_DIVISOR must be a non-zero number".to_string(),
            ));
        }

        let poll_ms = parse_or(get("POLL_INTERVAL_MS"), "POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        let poll_interval = PollInterval::from_millis(poll_ms)
            .map_err(|e| AgentError::Config(format!("POLL_INTERVAL_MS: {e}")))?;

        let outbox_capacity = parse_or(get("OUTBOX_CAPACITY"), "OUTBOX_CAPACITY", DEFAULT_OUTBOX_CAPACITY)?;
        if outbox_capacity == 0 {
            return Err(AgentError::Config("OUTBOX_CAPACITY must be at least 1".to_string()));
        }

        let bundle_source = match get("FTP_HOST") {
            Some(host) => Some(BundleSource::Ftp(FtpSettings {
                host,
                port: parse_or(get("FTP_PORT"), "FTP_PORT", DEFAULT_FTP_PORT)?,
                username: get("FTP_USER").unwrap_or_else(|| DEFAULT_FTP_USER.to_string()),
                // Passwords keep their surrounding whitespace.
                password: lookup("FTP_PASSWORD").unwrap_or_default(),
                directory: get("FTP_DIR"),
                timeout: Duration::from_millis(parse_or(
                    get("FTP_TIMEOUT_MS"),
                    "FTP_TIMEOUT_MS",
                    DEFAULT_FTP_TIMEOUT_MS,
                )?),
            })),
            None => get("BUNDLE_SOURCE_DIR").map(|dir| BundleSource::Directory(PathBuf::from(dir))),
        };

        Ok(Self {
            ws_url: require("BACKEND_WS_URL")?,
            http_url: get("BACKEND_HTTP_URL").map(|u| u.trim_end_matches('/').to_string()),
            device_id: get("DEVICE_ID").unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string()),
            modbus_host: require("MODBUS_HOST")?,
            modbus_port: parse_or(get("MODBUS_PORT"), "MODBUS_PORT", DEFAULT_MODBUS_PORT)?,
            unit_id: parse_or(get("MODBUS_UNIT_ID"), "MODBUS_UNIT_ID", DEFAULT_UNIT_ID)?,
            modbus_timeout: Duration::from_millis(parse_or(
                get("MODBUS_TIMEOUT_MS"),
                "MODBUS_TIMEOUT_MS",
                DEFAULT_MODBUS_TIMEOUT_MS,
            )?),
            block,
            scale_divisor,
            channel_prefix: get("CHANNEL_PREFIX").unwrap_or_else(|| "T".to_string()),
            poll_interval,
            bundle_source,
            outbox_capacity,
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T, AgentError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|e| AgentError::Config(format!("{key} is invalid: {e}"))),
        None => Ok(default),
    }
}
