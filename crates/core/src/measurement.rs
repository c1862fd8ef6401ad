//! The [`Measurement`] produced by one polling cycle.
//!
//! A measurement is immutable once built. Construction goes through
//! [`Measurement::new`] (or deserialization, which routes through the same
//! check) so `channels`, `values` and `raw` always have the same length.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// One polling cycle's decoded readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MeasurementRecord")]
pub struct Measurement {
    device_id: String,
    /// Capture instant, seconds since the Unix epoch.
    timestamp: f64,
    channels: Vec<String>,
    values: Vec<f64>,
    raw: Vec<u16>,
}

/// Unchecked wire form. Accepts the legacy `temperatures` / `raw_registers`
/// field names emitted by older gateways.
#[derive(Debug, Deserialize)]
struct MeasurementRecord {
    device_id: String,
    timestamp: f64,
    channels: Vec<String>,
    #[serde(alias = "temperatures")]
    values: Vec<f64>,
    #[serde(alias = "raw_registers")]
    raw: Vec<u16>,
}

impl TryFrom<MeasurementRecord> for Measurement {
    type Error = CoreError;

    fn try_from(r: MeasurementRecord) -> Result<Self, Self::Error> {
        Measurement::new(r.device_id, r.timestamp, r.channels, r.values, r.raw)
    }
}

impl Measurement {
    pub fn new(
        device_id: impl Into<String>,
        timestamp: f64,
        channels: Vec<String>,
        values: Vec<f64>,
        raw: Vec<u16>,
    ) -> Result<Self, CoreError> {
        let device_id = device_id.into();
        if device_id.is_empty() {
            return Err(CoreError::Validation("device_id is required".to_string()));
        }
        if !timestamp.is_finite() {
            return Err(CoreError::Validation(format!(
                "timestamp must be finite, got {timestamp}"
            )));
        }
        if channels.len() != values.len() || channels.len() != raw.len() {
            return Err(CoreError::Invariant(format!(
                "channels/values/raw length mismatch: {}/{}/{}",
                channels.len(),
                values.len(),
                raw.len()
            )));
        }
        Ok(Self {
            device_id,
            timestamp,
            channels,
            values,
            raw,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn raw(&self) -> &[u16] {
        &self.raw
    }

    /// Iterate `(channel, value)` pairs in channel order.
    pub fn readings(&self) -> impl Iterator<Item = (&str, f64)> {
        self.channels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn labels(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("T{i}")).collect()
    }

    #[test]
    fn new_accepts_matching_lengths() {
        let m = Measurement::new("dev", 1.0, labels(2), vec![1.0, 2.0], vec![10, 20]).unwrap();
        assert_eq!(m.len(), 2);
        let pairs: Vec<_> = m.readings().collect();
        assert_eq!(pairs, vec![("T1", 1.0), ("T2", 2.0)]);
    }

    #[test]
    fn new_rejects_length_mismatch() {
        let err = Measurement::new("dev", 1.0, labels(2), vec![1.0], vec![10, 20]).unwrap_err();
        assert_matches!(err, CoreError::Invariant(_));

        let err = Measurement::new("dev", 1.0, labels(2), vec![1.0, 2.0], vec![10]).unwrap_err();
        assert_matches!(err, CoreError::Invariant(_));
    }

    #[test]
    fn new_rejects_empty_device_and_nan_timestamp() {
        assert_matches!(
            Measurement::new("", 1.0, vec![], vec![], vec![]),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            Measurement::new("dev", f64::NAN, vec![], vec![], vec![]),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn deserialize_enforces_invariant() {
        let bad = r#"{"device_id":"d","timestamp":1.0,"channels":["T1"],"values":[],"raw":[1]}"#;
        assert!(serde_json::from_str::<Measurement>(bad).is_err());
    }

    #[test]
    fn deserialize_accepts_legacy_field_names() {
        let legacy = r#"{
            "device_id": "radix-umx201",
            "timestamp": 1759155793.19,
            "channels": ["T1", "T2"],
            "temperatures": [33.6, 33.5],
            "raw_registers": [336, 335]
        }"#;
        let m: Measurement = serde_json::from_str(legacy).unwrap();
        assert_eq!(m.values(), &[33.6, 33.5]);
        assert_eq!(m.raw(), &[336, 335]);
    }

    #[test]
    fn serializes_with_canonical_field_names() {
        let m = Measurement::new("d", 2.5, labels(1), vec![1.5], vec![15]).unwrap();
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["values"][0], 1.5);
        assert_eq!(json["raw"][0], 15);
        assert!(json.get("temperatures").is_none());
    }
}
