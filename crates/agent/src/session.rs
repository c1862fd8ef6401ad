//! WebSocket session with the backend.
//!
//! Connects to the producer endpoint, forwards measurements from the
//! poller's outbox as JSON text frames and executes commands pushed by the
//! backend: `set_interval` updates the poller's interval and `fetch_files`
//! builds and uploads a file bundle. The connection is re-established with
//! exponential backoff whenever it drops.

use std::sync::Arc;

use futures::{SinkExt, Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use thermogate_core::measurement::Measurement;
use thermogate_core::polling::PollInterval;
use thermogate_core::protocol::{ProducerCommand, ProducerMessage};
use thermogate_core::types::RequestId;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::bundle::{build_bundle_async, BundleSource};
use crate::error::AgentError;
use crate::reconnect::{Backoff, ReconnectConfig};

/// Pending `retrieval_failed` replies from upload tasks.
const REPLY_QUEUE_CAPACITY: usize = 8;

type WsError = tokio_tungstenite::tungstenite::Error;

/// Everything a session needs besides the socket.
#[derive(Clone)]
pub struct SessionContext {
    pub ws_url: String,
    pub http_url: Option<String>,
    pub bundle_source: Option<BundleSource>,
    /// Feeds the poller's interval.
    pub interval: Arc<watch::Sender<PollInterval>>,
    pub http: reqwest::Client,
}

/// What a decoded backend command did.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    IntervalChanged(PollInterval),
    RetrievalStarted(RequestId),
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Connection lost; reconnect.
    Disconnected,
    /// Cancelled or the poller went away; stop for good.
    Stopped,
}

/// Run sessions until cancelled, reconnecting with backoff.
pub async fn run(
    ctx: SessionContext,
    mut outbox: mpsc::Receiver<Measurement>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new(reconnect);

    loop {
        tracing::info!(url = %ctx.ws_url, "Connecting to backend WebSocket");

        let connected = tokio::select! {
            () = cancel.cancelled() => return,
            result = connect_async(ctx.ws_url.as_str()) => result,
        };

        match connected {
            Ok((ws_stream, _response)) => {
                tracing::info!("WebSocket connected");
                backoff.reset();
                let (sink, stream) = ws_stream.split();
                if run_session(&ctx, sink, stream, &mut outbox, &cancel).await == SessionEnd::Stopped {
                    tracing::info!("Session loop stopped");
                    return;
                }
                tracing::warn!("WebSocket session ended, reconnecting");
            }
            Err(e) => {
                tracing::error!(error = %e, "WebSocket connection failed");
            }
        }

        let wait = backoff.next_wait();
        tracing::debug!(delay_ms = wait.as_millis() as u64, "Waiting before reconnect");
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(wait) => {}
        }
    }
}

/// Drive one connected session.
async fn run_session<S, R>(
    ctx: &SessionContext,
    mut sink: S,
    mut stream: R,
    outbox: &mut mpsc::Receiver<Measurement>,
    cancel: &CancellationToken,
) -> SessionEnd
where
    S: SinkExt<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let (reply_tx, mut reply_rx) = mpsc::channel::<ProducerMessage>(REPLY_QUEUE_CAPACITY);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Stopped;
            }
            next = outbox.recv() => {
                let Some(measurement) = next else {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Stopped;
                };
                if let Err(e) = send_message(&mut sink, &ProducerMessage::Measurement(measurement)).await {
                    tracing::error!(error = %e, "Failed to send measurement");
                    return SessionEnd::Disconnected;
                }
            }
            Some(reply) = reply_rx.recv() => {
                if let Err(e) = send_message(&mut sink, &reply).await {
                    tracing::error!(error = %e, "Failed to send retrieval reply");
                    return SessionEnd::Disconnected;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_command(&text, ctx, &reply_tx);
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Backend closed WebSocket");
                        return SessionEnd::Disconnected;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket receive error");
                        return SessionEnd::Disconnected;
                    }
                    None => {
                        tracing::info!("WebSocket stream exhausted");
                        return SessionEnd::Disconnected;
                    }
                }
            }
        }
    }
}

async fn send_message<S>(sink: &mut S, message: &ProducerMessage) -> Result<(), WsError>
where
    S: SinkExt<Message, Error = WsError> + Unpin,
{
    match serde_json::to_string(message) {
        Ok(json) => sink.send(Message::Text(json)).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize producer message");
            Ok(())
        }
    }
}

/// Decode and execute one backend command.
///
/// Retrieval runs on its own task; a failure is reported back through
/// `replies` as `retrieval_failed`.
pub fn handle_command(
    text: &str,
    ctx: &SessionContext,
    replies: &mpsc::Sender<ProducerMessage>,
) -> CommandOutcome {
    match serde_json::from_str::<ProducerCommand>(text) {
        Ok(ProducerCommand::SetInterval { interval_ms }) => {
            let previous = ctx.interval.send_replace(interval_ms);
            tracing::info!(
                from_ms = previous.as_millis(),
                to_ms = interval_ms.as_millis(),
                "Polling interval changed"
            );
            CommandOutcome::IntervalChanged(interval_ms)
        }
        Ok(ProducerCommand::FetchFiles { request_id }) => {
            tracing::info!(%request_id, "Received fetch command");
            let ctx = ctx.clone();
            let replies = replies.clone();
            tokio::spawn(async move {
                match upload_bundle(&ctx, request_id).await {
                    Ok(size_bytes) => {
                        tracing::info!(%request_id, size_bytes, "Bundle uploaded");
                    }
                    Err(e) => {
                        tracing::warn!(%request_id, error = %e, "Retrieval failed");
                        let reply = ProducerMessage::RetrievalFailed {
                            request_id,
                            message: e.to_string(),
                        };
                        if replies.send(reply).await.is_err() {
                            tracing::warn!(%request_id, "Session gone, retrieval failure not reported");
                        }
                    }
                }
            });
            CommandOutcome::RetrievalStarted(request_id)
        }
        Err(e) => {
            tracing::warn!(error = %e, raw = %text, "Unknown or malformed incoming message");
            CommandOutcome::Ignored
        }
    }
}

/// Build the bundle and POST it to the backend. Returns the uploaded size.
pub async fn upload_bundle(ctx: &SessionContext, request_id: RequestId) -> Result<usize, AgentError> {
    let base = ctx.http_url.as_deref().ok_or_else(|| {
        AgentError::Config("BACKEND_HTTP_URL is required for bundle uploads".to_string())
    })?;
    let bytes = build_bundle_async(ctx.bundle_source.clone()).await?;
    let size = bytes.len();

    let response = ctx
        .http
        .post(format!("{base}/api/v1/retrieval/{request_id}/bundle"))
        .header(CONTENT_TYPE, "application/zip")
        .body(bytes)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(AgentError::UploadRejected(status.as_u16()));
    }
    Ok(size)
}
