use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use futures::StreamExt;
use thermogate_core::protocol::{ConsumerCommand, OutboundEvent};

use crate::hub::{Registration, Role};
use crate::retrieval::summarize;
use crate::state::AppState;
use crate::ws::{drain_sender, spawn_sender};

/// HTTP handler that upgrades a frontend connection to WebSocket.
pub async fn frontend_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_frontend_socket(socket, state))
}

async fn handle_frontend_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let Some(Registration { receiver, closed }) =
        state.hub.register(conn_id.clone(), Role::Consumer).await
    else {
        tracing::error!(conn_id = %conn_id, "Duplicate consumer connection id");
        return;
    };
    tracing::info!(conn_id = %conn_id, "Consumer connected");

    let (sink, mut stream) = socket.split();
    let mut send_task = spawn_sender(conn_id.clone(), receiver, sink);

    loop {
        tokio::select! {
            _ = closed.cancelled() => {
                tracing::debug!(conn_id = %conn_id, "Consumer dropped by hub");
                drain_sender(&mut send_task).await;
                break;
            }
            _ = &mut send_task => break,
            next = stream.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    handle_consumer_frame(&state, &conn_id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "Consumer receive error");
                    break;
                }
            }
        }
    }

    state.hub.unregister(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Consumer disconnected");
}

async fn handle_consumer_frame(state: &AppState, conn_id: &str, text: &str) {
    let reply = match serde_json::from_str::<ConsumerCommand>(text) {
        Ok(ConsumerCommand::Ping) => OutboundEvent::Pong { ts: Utc::now() },
        Ok(ConsumerCommand::Health) => OutboundEvent::Health(state.health_snapshot().await),
        Ok(ConsumerCommand::FetchFiles) => {
            // The wait can last up to the retrieval deadline; keep reading
            // this consumer's frames meanwhile.
            let state = state.clone();
            let conn_id = conn_id.to_string();
            tokio::spawn(async move {
                let result = state.retrieval.trigger().await;
                let summary = summarize(&result);
                state
                    .hub
                    .send_to(&conn_id, &OutboundEvent::RetrievalResult(summary))
                    .await;
            });
            return;
        }
        Err(_) => OutboundEvent::Ack {
            data: serde_json::from_str(text)
                .unwrap_or_else(|_| serde_json::Value::String(text.to_string())),
        },
    };
    state.hub.send_to(conn_id, &reply).await;
}
