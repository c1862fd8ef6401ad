//! Stored measurements and history query parameters.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use thermogate_core::measurement::Measurement;
use thermogate_core::types::Timestamp;

/// Page size used when a history query does not specify one.
pub const DEFAULT_PAGE_LIMIT: i64 = 100;

/// Upper bound on a single history page.
pub const MAX_PAGE_LIMIT: i64 = 200_000;

/// Raw `measurements` row.
#[derive(Debug, Clone, FromRow)]
pub struct MeasurementRow {
    pub id: i64,
    pub device_id: String,
    pub payload: Json<Measurement>,
    pub received_at: Timestamp,
}

/// A persisted measurement as returned to history readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMeasurement {
    pub id: i64,
    pub device_id: String,
    pub payload: Measurement,
    pub received_at: Timestamp,
}

impl From<MeasurementRow> for StoredMeasurement {
    fn from(row: MeasurementRow) -> Self {
        Self {
            id: row.id,
            device_id: row.device_id,
            payload: row.payload.0,
            received_at: row.received_at,
        }
    }
}

/// History filter. All bounds are inclusive; results are newest first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeasurementFilter {
    pub device_id: Option<String>,
    #[serde(alias = "start_datetime")]
    pub start: Option<Timestamp>,
    #[serde(alias = "end_datetime")]
    pub end: Option<Timestamp>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl MeasurementFilter {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// Whether a row passes the device and time filters (paging excluded).
    pub fn matches(&self, device_id: &str, received_at: Timestamp) -> bool {
        self.device_id.as_deref().is_none_or(|d| d == device_id)
            && self.start.is_none_or(|s| received_at >= s)
            && self.end.is_none_or(|e| received_at <= e)
    }
}

/// Body of a history delete request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteMeasurements {
    /// Delete the oldest `count` rows.
    pub count: Option<i64>,
    #[serde(alias = "start_datetime")]
    pub start: Option<Timestamp>,
    #[serde(alias = "end_datetime")]
    pub end: Option<Timestamp>,
}

/// A resolved delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    Oldest(i64),
    Between { start: Timestamp, end: Timestamp },
}

impl DeleteMeasurements {
    /// `count` wins over a range; a range needs both ends.
    pub fn scope(&self) -> Option<DeleteScope> {
        match (self.count, self.start, self.end) {
            (Some(n), _, _) if n > 0 => Some(DeleteScope::Oldest(n)),
            (_, Some(start), Some(end)) if start <= end => {
                Some(DeleteScope::Between { start, end })
            }
            _ => None,
        }
    }
}
