//! Repository for the `measurements` table (append-mostly time series).

use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use thermogate_core::measurement::Measurement;
use thermogate_core::types::Timestamp;

use crate::models::measurement::{DeleteScope, MeasurementFilter, MeasurementRow};

const COLUMNS: &str = "id, device_id, payload, received_at";

/// Provides query operations for stored measurements.
pub struct MeasurementRepo;

impl MeasurementRepo {
    /// Append one measurement.
    pub async fn insert(
        pool: &PgPool,
        measurement: &Measurement,
        received_at: Timestamp,
    ) -> Result<MeasurementRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO measurements (device_id, payload, received_at) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MeasurementRow>(&query)
            .bind(measurement.device_id())
            .bind(Json(measurement))
            .bind(received_at)
            .fetch_one(pool)
            .await
    }

    /// Filtered page of history, newest first.
    pub async fn list(
        pool: &PgPool,
        filter: &MeasurementFilter,
    ) -> Result<Vec<MeasurementRow>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM measurements WHERE TRUE"));
        if let Some(device_id) = &filter.device_id {
            qb.push(" AND device_id = ").push_bind(device_id.clone());
        }
        if let Some(start) = filter.start {
            qb.push(" AND received_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end {
            qb.push(" AND received_at <= ").push_bind(end);
        }
        qb.push(" ORDER BY received_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit())
            .push(" OFFSET ")
            .push_bind(filter.offset());

        qb.build_query_as::<MeasurementRow>().fetch_all(pool).await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM measurements")
            .fetch_one(pool)
            .await
    }

    /// Returns the number of rows deleted.
    pub async fn delete(pool: &PgPool, scope: DeleteScope) -> Result<u64, sqlx::Error> {
        let result = match scope {
            DeleteScope::Oldest(n) => {
                sqlx::query(
                    "DELETE FROM measurements WHERE id IN \
                     (SELECT id FROM measurements ORDER BY received_at ASC, id ASC LIMIT $1)",
                )
                .bind(n)
                .execute(pool)
                .await?
            }
            DeleteScope::Between { start, end } => {
                sqlx::query("DELETE FROM measurements WHERE received_at BETWEEN $1 AND $2")
                    .bind(start)
                    .bind(end)
                    .execute(pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }
}
