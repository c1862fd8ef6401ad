//! Thermogate domain types and pure telemetry logic.
//!
//! Nothing in this crate performs I/O: register decoding, the
//! measurement invariant, threshold and staleness state machines and the
//! WebSocket envelopes all live here so they can be tested in isolation.

pub mod alert;
pub mod email;
pub mod error;
pub mod measurement;
pub mod polling;
pub mod protocol;
pub mod registers;
pub mod staleness;
pub mod threshold;
pub mod types;
