//! Persistence collaborator for the telemetry pipeline.
//!
//! The pipeline talks to storage only through [`TelemetryStore`]. Two
//! implementations ship here: [`PgTelemetryStore`] on top of the repository
//! layer, and [`MemoryTelemetryStore`] for running without a database.

use sqlx::postgres::PgPoolOptions;

pub mod models;
pub mod repositories;
pub mod store;

pub use store::memory::MemoryTelemetryStore;
pub use store::postgres::PgTelemetryStore;
pub use store::{StoreError, TelemetryStore};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify the pool is usable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations in `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
