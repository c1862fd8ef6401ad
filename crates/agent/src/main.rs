//! `thermogate-agent` -- device-side gateway daemon.
//!
//! Polls the temperature bank's holding registers over Modbus TCP and
//! pushes each decoded measurement to the backend over WebSocket. Also
//! obeys backend commands: polling interval changes and file bundle
//! retrieval.
//!
//! # Environment variables
//!
//! | Variable            | Required | Default        | Description                                   |
//! |---------------------|----------|----------------|-----------------------------------------------|
//! | `BACKEND_WS_URL`    | yes      | --             | e.g. `ws://host:8000/api/v1/ws/producer`      |
//! | `BACKEND_HTTP_URL`  | no       | --             | Base URL for bundle uploads                   |
//! | `DEVICE_ID`         | no       | `radix-umx201` | Identifier stamped on every measurement       |
//! | `MODBUS_HOST`       | yes      | --             | Device address                                |
//! | `MODBUS_PORT`       | no       | `502`          |                                               |
//! | `MODBUS_UNIT_ID`    | no       | `1`            |                                               |
//! | `MODBUS_TIMEOUT_MS` | no       | `3000`         | Per-read deadline                             |
//! | `REGISTER_START`    | no       | `0`            | First holding register                        |
//! | `REGISTER_COUNT`    | no       | `8`            | One register per channel                      |
//! | `SCALE_DIVISOR`     | no       | `10`           | Raw value divisor                             |
//! | `CHANNEL_PREFIX`    | no       | `T`            | Channel labels are `{prefix}1..`              |
//! | `POLL_INTERVAL_MS`  | no       | `5000`         | Initial interval, at least `200`              |
//! | `FTP_HOST`          | no       | --             | Device FTP server the bundle is fetched from  |
//! | `FTP_PORT`          | no       | `21`           |                                               |
//! | `FTP_USER`          | no       | `anonymous`    |                                               |
//! | `FTP_PASSWORD`      | no       | empty          |                                               |
//! | `FTP_DIR`           | no       | login dir      | Remote directory to list                      |
//! | `FTP_TIMEOUT_MS`    | no       | `10000`        | FTP connect deadline                          |
//! | `BUNDLE_SOURCE_DIR` | no       | --             | Local directory zipped when `FTP_HOST` unset  |
//! | `OUTBOX_CAPACITY`   | no       | `64`           | Measurements buffered while disconnected      |

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use thermogate_agent::config::AgentConfig;
use thermogate_agent::modbus::ModbusTcpReader;
use thermogate_agent::poller::{self, PollSettings};
use thermogate_agent::reconnect::ReconnectConfig;
use thermogate_agent::session::{self, SessionContext};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thermogate_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid agent configuration");
        std::process::exit(1);
    });

    tracing::info!(
        device_id = %config.device_id,
        ws_url = %config.ws_url,
        modbus = %format!("{}:{}", config.modbus_host, config.modbus_port),
        interval_ms = config.poll_interval.as_millis(),
        "Starting thermogate-agent",
    );
    if config.http_url.is_none() {
        tracing::warn!("BACKEND_HTTP_URL not set, retrieval requests will fail");
    }

    let cancel = CancellationToken::new();
    let (interval_tx, interval_rx) = watch::channel(config.poll_interval);
    let (outbox_tx, outbox_rx) = mpsc::channel(config.outbox_capacity);

    let reader = ModbusTcpReader::new(
        config.modbus_host.clone(),
        config.modbus_port,
        config.unit_id,
        config.modbus_timeout,
    );
    let settings = PollSettings {
        device_id: config.device_id.clone(),
        block: config.block,
        scale_divisor: config.scale_divisor,
        channel_prefix: config.channel_prefix.clone(),
    };
    let poller_handle = tokio::spawn(poller::run(
        reader,
        settings,
        interval_rx,
        outbox_tx,
        cancel.clone(),
    ));

    let ctx = SessionContext {
        ws_url: config.ws_url.clone(),
        http_url: config.http_url.clone(),
        bundle_source: config.bundle_source.clone(),
        interval: Arc::new(interval_tx),
        http: reqwest::Client::new(),
    };
    let session_handle = tokio::spawn(session::run(
        ctx,
        outbox_rx,
        ReconnectConfig::default(),
        cancel.clone(),
    ));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
    tracing::info!("Shutting down");
    cancel.cancel();

    let _ = poller_handle.await;
    let _ = session_handle.await;
    tracing::info!("Agent stopped");
}
