//! `thermogate-agent` library crate.
//!
//! Re-exports internal modules for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod bundle;
pub mod config;
pub mod error;
pub mod modbus;
pub mod poller;
pub mod reconnect;
pub mod session;
