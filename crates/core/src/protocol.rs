//! WebSocket message envelopes.
//!
//! All frames are JSON text. Every envelope is a closed, `type`-tagged enum;
//! raw JSON only appears at the transport edge (see [`parse_producer_frame`]).

use serde::{Deserialize, Serialize};

use crate::alert::AlertEvent;
use crate::measurement::Measurement;
use crate::polling::PollInterval;
use crate::staleness::WatchdogState;
use crate::types::{RequestId, Timestamp};

/// Type discriminator for measurement frames (both directions).
pub const MSG_TYPE_MEASUREMENT: &str = "measurement";

/// Suggested file name for a retrieved bundle.
pub const BUNDLE_FILE_NAME: &str = "device_files.zip";

// ---------------------------------------------------------------------------
// Backend -> consumer
// ---------------------------------------------------------------------------

/// Read-only snapshot for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub last_measurement_at: Option<Timestamp>,
    pub watchdog: WatchdogState,
    pub connected_producers: usize,
    pub connected_consumers: usize,
}

/// Outcome of a retrieval, as reported on the live stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSummary {
    pub request_id: Option<RequestId>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Measurement {
        device_id: String,
        payload: Measurement,
        received_at: Timestamp,
    },
    Alert(AlertEvent),
    Health(HealthSnapshot),
    RetrievalResult(RetrievalSummary),
    /// Producer chatter that is not a measurement, relayed verbatim.
    GatewayMessage {
        content: serde_json::Value,
        received_at: Timestamp,
    },
    Pong {
        ts: Timestamp,
    },
    Ack {
        data: serde_json::Value,
    },
}

impl OutboundEvent {
    pub fn measurement(m: Measurement, received_at: Timestamp) -> Self {
        Self::Measurement {
            device_id: m.device_id().to_string(),
            payload: m,
            received_at,
        }
    }

    /// Encode as a JSON text frame body.
    pub fn to_json(&self) -> String {
        // Every variant is built from plain data; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

// ---------------------------------------------------------------------------
// Backend -> producer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProducerCommand {
    /// Gather the device's files and upload them for `request_id`.
    FetchFiles { request_id: RequestId },
    /// Use a new polling interval from the next cycle on.
    SetInterval { interval_ms: PollInterval },
}

// ---------------------------------------------------------------------------
// Producer -> backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProducerMessage {
    Measurement(Measurement),
    RetrievalFailed {
        request_id: RequestId,
        message: String,
    },
}

/// A decoded inbound producer frame.
#[derive(Debug, Clone)]
pub enum ProducerFrame {
    Message(ProducerMessage),
    /// Valid JSON that is not part of the protocol.
    Other(serde_json::Value),
    /// Looked like a measurement but failed validation.
    Invalid(String),
}

/// Decode a producer text frame.
///
/// Tagged frames are parsed strictly. Untagged frames carrying a
/// `device_id` (or a nested `data` object with one) are treated as legacy
/// measurements. Anything else is passed through as [`ProducerFrame::Other`].
pub fn parse_producer_frame(text: &str) -> ProducerFrame {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return ProducerFrame::Other(serde_json::json!({ "raw": text })),
    };

    if let Some(tag) = value.get("type").and_then(|t| t.as_str()) {
        let known = matches!(tag, MSG_TYPE_MEASUREMENT | "retrieval_failed");
        return match serde_json::from_value::<ProducerMessage>(value.clone()) {
            Ok(msg) => ProducerFrame::Message(msg),
            Err(e) if known => ProducerFrame::Invalid(e.to_string()),
            Err(_) => ProducerFrame::Other(value),
        };
    }

    let legacy = if value.get("device_id").is_some() {
        Some(value.clone())
    } else {
        value
            .get("data")
            .filter(|d| d.get("device_id").is_some())
            .cloned()
    };

    match legacy {
        Some(body) => match serde_json::from_value::<Measurement>(body) {
            Ok(m) => ProducerFrame::Message(ProducerMessage::Measurement(m)),
            Err(e) => ProducerFrame::Invalid(e.to_string()),
        },
        None => ProducerFrame::Other(value),
    }
}

// ---------------------------------------------------------------------------
// Consumer -> backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ConsumerCommand {
    Ping,
    Health,
    #[serde(alias = "ftp-fetch")]
    FetchFiles,
}
