//! WebSocket endpoints for producers (pollers) and consumers (frontends).
//!
//! Every connection is one task that owns the inbound half of the socket
//! plus one spawned sender task that drains the hub's per-subscriber queue
//! into the outbound half.

mod frontend;
mod heartbeat;
mod producer;

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use thermogate_core::types::ConnId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use frontend::frontend_ws_handler;
pub use heartbeat::start_heartbeat;
pub use producer::producer_ws_handler;

/// How long a connection dropped by the hub waits for frames it already
/// queued, the shutdown Close among them, to reach the socket.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Wait for the sender to flush and finish once the hub has dropped its
/// queue.
async fn drain_sender(send_task: &mut JoinHandle<()>) {
    let _ = tokio::time::timeout(DRAIN_TIMEOUT, send_task).await;
}

/// Forward queued frames to the socket until the queue closes or the
/// peer goes away.
fn spawn_sender(
    conn_id: ConnId,
    mut rx: mpsc::Receiver<Message>,
    mut sink: SplitSink<WebSocket, Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %conn_id, "WebSocket sink closed");
                break;
            }
        }
    })
}
