use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use thermogate_api::background::staleness_watchdog;
use thermogate_api::config::ServerConfig;
use thermogate_api::notifications::{email_settings_from_env, EmailNotifier};
use thermogate_api::router::build_app_router;
use thermogate_api::state::AppState;
use thermogate_api::ws;
use thermogate_db::{MemoryTelemetryStore, PgTelemetryStore, TelemetryStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thermogate_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        polling_interval_ms = config.polling_interval.as_millis(),
        retrieval_policy = ?config.retrieval_policy,
        "Loaded server configuration"
    );

    let store = open_store(&config).await;

    // --- App state ---
    let state = AppState::new(config.clone(), store);
    let thresholds = state
        .seed_default_thresholds()
        .await
        .expect("Failed to load channel thresholds");
    tracing::info!(thresholds, "Alert engine ready");
    state
        .seed_email_settings(email_settings_from_env())
        .await
        .expect("Failed to seed alert email settings");

    // --- Background tasks ---
    let cancel = CancellationToken::new();

    let watchdog_handle = tokio::spawn(staleness_watchdog::run(
        Arc::clone(&state.alerts),
        Arc::clone(&state.hub),
        Arc::clone(&state.polling),
        Duration::from_secs(config.staleness_check_secs),
        cancel.clone(),
    ));

    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&state.hub),
        Duration::from_secs(config.heartbeat_interval_secs),
        cancel.clone(),
    );

    let notifier_handle = tokio::spawn(
        EmailNotifier::new(Arc::clone(&state.store))
            .run(state.hub.subscribe_alerts(), cancel.clone()),
    );

    // --- Router ---
    let hub = Arc::clone(&state.hub);
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), watchdog_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), heartbeat_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), notifier_handle).await;
    tracing::info!("Background tasks stopped");

    hub.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise the in-memory store.
async fn open_store(config: &ServerConfig) -> Arc<dyn TelemetryStore> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, measurements are kept in memory only");
        return Arc::new(MemoryTelemetryStore::new());
    };

    let pool = thermogate_db::create_pool(database_url)
        .await
        .expect("Failed to connect to database");
    thermogate_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    thermogate_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready, migrations applied");

    Arc::new(PgTelemetryStore::new(pool))
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
