use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::hub::{Hub, Role};

/// Spawn a background task that sends periodic Ping frames to all connected
/// WebSocket clients.
///
/// The task runs until `cancel` is triggered. Pings go through each
/// subscriber's bounded queue, so a dead peer eventually overflows and is
/// dropped by the hub.
pub fn start_heartbeat(
    hub: Arc<Hub>,
    every: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let producers = hub.count(Role::Producer).await;
                    let consumers = hub.count(Role::Consumer).await;
                    tracing::debug!(producers, consumers, "WebSocket heartbeat ping");
                    hub.ping_all().await;
                }
            }
        }
    })
}
