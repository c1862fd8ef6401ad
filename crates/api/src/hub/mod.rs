//! Broadcast hub: the single fan-out point between producers and consumers.
//!
//! The [`Hub`] owns the subscriber registry and the durable-write path.
//! Components that need to react to traffic plug in through two hooks:
//!
//! - [`MeasurementObserver`] is awaited in-line for every published
//!   measurement and may return alerts, which the hub then publishes.
//! - [`DisconnectListener`] is told when a producer leaves the registry.

use async_trait::async_trait;
use thermogate_core::alert::AlertEvent;
use thermogate_core::measurement::Measurement;

mod registry;

pub use registry::{Hub, Registration};

/// Which side of the pipeline a subscriber is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A poller supplying measurements.
    Producer,
    /// A frontend receiving the live event stream.
    Consumer,
}

/// Synchronous observation hook on the publish path.
#[async_trait]
pub trait MeasurementObserver: Send + Sync {
    async fn observe(&self, measurement: &Measurement) -> Vec<AlertEvent>;
}

pub trait DisconnectListener: Send + Sync {
    fn producer_disconnected(&self, conn_id: &str);
}
