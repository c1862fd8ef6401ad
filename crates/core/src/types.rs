/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque identifier of a live WebSocket connection (producer or consumer).
pub type ConnId = String;

/// Identifier of a single bulk-file retrieval request.
pub type RequestId = uuid::Uuid;
