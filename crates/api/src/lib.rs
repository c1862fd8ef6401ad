//! Thermogate backend library.
//!
//! Exposes the pipeline building blocks (hub, alert engine, retrieval
//! orchestrator) alongside config, state, error handling and routes so
//! integration tests and the binary entrypoint share the same wiring.

pub mod alerts;
pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod notifications;
pub mod polling;
pub mod response;
pub mod retrieval;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
