use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use futures::StreamExt;
use thermogate_core::protocol::{parse_producer_frame, OutboundEvent, ProducerFrame, ProducerMessage};

use crate::hub::{Registration, Role};
use crate::state::AppState;
use crate::ws::{drain_sender, spawn_sender};

/// HTTP handler that upgrades a poller connection to WebSocket.
pub async fn producer_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_producer_socket(socket, state))
}

/// Manage a single producer connection.
///
/// Frames are handled one at a time in arrival order, which is what keeps
/// a producer's measurements ordered for every consumer.
async fn handle_producer_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let Some(Registration { receiver, closed }) =
        state.hub.register(conn_id.clone(), Role::Producer).await
    else {
        tracing::error!(conn_id = %conn_id, "Duplicate producer connection id");
        return;
    };
    tracing::info!(conn_id = %conn_id, "Producer connected");

    let (sink, mut stream) = socket.split();
    let mut send_task = spawn_sender(conn_id.clone(), receiver, sink);

    // Bring the poller in line with the current interval straight away.
    state.hub.send_to(&conn_id, &state.polling.command()).await;

    loop {
        tokio::select! {
            _ = closed.cancelled() => {
                tracing::debug!(conn_id = %conn_id, "Producer dropped by hub");
                drain_sender(&mut send_task).await;
                break;
            }
            _ = &mut send_task => break,
            next = stream.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    handle_producer_frame(&state, &conn_id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "Producer receive error");
                    break;
                }
            }
        }
    }

    state.hub.unregister(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Producer disconnected");
}

async fn handle_producer_frame(state: &AppState, conn_id: &str, text: &str) {
    match parse_producer_frame(text) {
        ProducerFrame::Message(ProducerMessage::Measurement(measurement)) => {
            state.hub.publish_measurement(measurement).await;
        }
        ProducerFrame::Message(ProducerMessage::RetrievalFailed {
            request_id,
            message,
        }) => {
            if !state.retrieval.fail(request_id, message) {
                tracing::debug!(conn_id = %conn_id, %request_id, "Failure report for unknown retrieval");
            }
        }
        ProducerFrame::Other(content) => {
            state
                .hub
                .publish_event(&OutboundEvent::GatewayMessage {
                    content,
                    received_at: Utc::now(),
                })
                .await;
        }
        ProducerFrame::Invalid(reason) => {
            tracing::warn!(conn_id = %conn_id, reason = %reason, "Rejected malformed measurement");
        }
    }
}
