//! On-demand file-bundle retrieval from a connected producer.
//!
//! At most one request is outstanding per producer. Each in-flight entry
//! carries a `watch` channel that every waiting caller reads the result
//! from. Removing the entry from the map is the single point where a
//! request resolves: upload, producer failure, disconnect and the deadline
//! timer all race for it and exactly one wins; the others become no-ops.
//! The deadline timer belongs to the request, not to a caller, so the slot
//! frees on time even when every caller has gone away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::body::Bytes;
use chrono::Utc;
use serde::Serialize;
use thermogate_core::protocol::{ProducerCommand, RetrievalSummary};
use thermogate_core::types::{ConnId, RequestId, Timestamp};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::config::ConcurrentPolicy;
use crate::hub::{DisconnectListener, Hub};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalError {
    #[error("No producer connected")]
    NoProducerConnected,

    #[error("A retrieval is already in progress for this producer")]
    RetrievalInProgress,

    #[error("Producer did not respond before the deadline")]
    RequestTimeout,

    #[error("Producer reported failure: {0}")]
    ProducerFailed(String),

    #[error("Producer disconnected before responding")]
    ProducerDisconnected,

    #[error("Could not deliver the fetch command to the producer")]
    DispatchFailed,
}

impl RetrievalError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoProducerConnected => "no-producer-connected",
            Self::RetrievalInProgress => "retrieval-in-progress",
            Self::RequestTimeout => "request-timeout",
            Self::ProducerFailed(_) => "producer-failed",
            Self::ProducerDisconnected => "producer-disconnected",
            Self::DispatchFailed => "dispatch-failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetrievalState {
    Pending,
    AwaitingResponse,
    Fulfilled,
    Failed,
    TimedOut,
}

/// A successfully retrieved bundle.
#[derive(Debug, Clone)]
pub struct RetrievalBundle {
    pub request_id: RequestId,
    pub bytes: Bytes,
}

/// Condense a retrieval result for the live stream.
pub fn summarize(result: &Result<RetrievalBundle, RetrievalError>) -> RetrievalSummary {
    match result {
        Ok(bundle) => RetrievalSummary {
            request_id: Some(bundle.request_id),
            ok: true,
            code: None,
            size_bytes: Some(bundle.bytes.len()),
            message: None,
        },
        Err(e) => RetrievalSummary {
            request_id: None,
            ok: false,
            code: Some(e.code().to_string()),
            size_bytes: None,
            message: Some(e.to_string()),
        },
    }
}

type Outcome = Result<Bytes, RetrievalError>;
type Table = Mutex<HashMap<ConnId, InFlight>>;

struct InFlight {
    request_id: RequestId,
    state: RetrievalState,
    created_at: Timestamp,
    deadline_at: Timestamp,
    waiters: usize,
    result: watch::Sender<Option<Outcome>>,
    timer: Option<AbortHandle>,
}

/// Monitoring view of one outstanding request.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalSnapshot {
    pub request_id: RequestId,
    pub target: ConnId,
    pub state: RetrievalState,
    pub created_at: Timestamp,
    pub deadline: Timestamp,
    pub waiters: usize,
}

pub struct RetrievalOrchestrator {
    hub: Arc<Hub>,
    policy: ConcurrentPolicy,
    timeout: Duration,
    /// Keyed by target producer.
    in_flight: Arc<Table>,
}

impl RetrievalOrchestrator {
    pub fn new(hub: Arc<Hub>, policy: ConcurrentPolicy, timeout: Duration) -> Self {
        Self {
            hub,
            policy,
            timeout,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<ConnId, InFlight>> {
        lock(&self.in_flight)
    }

    /// Fetch a file bundle from the longest-connected producer.
    pub async fn trigger(&self) -> Result<RetrievalBundle, RetrievalError> {
        let target = self
            .hub
            .oldest_producer()
            .await
            .ok_or(RetrievalError::NoProducerConnected)?;

        let (request_id, mut rx, leader) = {
            let mut table = self.table();
            match table.get_mut(&target) {
                Some(existing) => match self.policy {
                    ConcurrentPolicy::Reject => return Err(RetrievalError::RetrievalInProgress),
                    ConcurrentPolicy::Join => {
                        existing.waiters += 1;
                        (existing.request_id, existing.result.subscribe(), false)
                    }
                },
                None => {
                    let request_id = uuid::Uuid::new_v4();
                    let deadline = Instant::now() + self.timeout;
                    let (result, rx) = watch::channel(None);
                    let now = Utc::now();
                    table.insert(
                        target.clone(),
                        InFlight {
                            request_id,
                            state: RetrievalState::Pending,
                            created_at: now,
                            deadline_at: now
                                + chrono::Duration::from_std(self.timeout)
                                    .unwrap_or(chrono::Duration::MAX),
                            waiters: 1,
                            result,
                            timer: None,
                        },
                    );
                    let timer = self.spawn_deadline(target.clone(), request_id, deadline);
                    if let Some(entry) = table.get_mut(&target) {
                        entry.timer = Some(timer);
                    }
                    (request_id, rx, true)
                }
            }
        };

        if leader {
            self.dispatch(&target, request_id).await;
        } else {
            tracing::info!(%request_id, target = %target, "Joined outstanding retrieval");
        }

        // The sender only goes away after publishing, so an error here is a
        // lost entry; report it like a vanished producer.
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => Some(Err(RetrievalError::ProducerDisconnected)),
        };

        outcome
            .unwrap_or(Err(RetrievalError::RequestTimeout))
            .map(|bytes| RetrievalBundle { request_id, bytes })
    }

    /// Expire the request at `deadline` whether or not anyone still waits.
    fn spawn_deadline(&self, target: ConnId, request_id: RequestId, deadline: Instant) -> AbortHandle {
        let table = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if resolve_in(&table, &target, request_id, Err(RetrievalError::RequestTimeout)) {
                tracing::warn!(%request_id, target = %target, "Retrieval timed out");
            }
        })
        .abort_handle()
    }

    /// Send the fetch command; fail the request at once if it can't be sent.
    async fn dispatch(&self, target: &str, request_id: RequestId) {
        let sent = self
            .hub
            .send_to(target, &ProducerCommand::FetchFiles { request_id })
            .await;
        if sent {
            if let Some(entry) = self.table().get_mut(target) {
                if entry.request_id == request_id && entry.state == RetrievalState::Pending {
                    entry.state = RetrievalState::AwaitingResponse;
                }
            }
            tracing::info!(%request_id, target = %target, "Fetch command sent");
        } else {
            self.resolve(target, request_id, Err(RetrievalError::DispatchFailed));
            tracing::warn!(%request_id, target = %target, "Fetch command could not be sent");
        }
    }

    fn resolve(&self, target: &str, request_id: RequestId, outcome: Outcome) -> bool {
        resolve_in(&self.in_flight, target, request_id, outcome)
    }

    fn target_of(&self, request_id: RequestId) -> Option<ConnId> {
        self.table()
            .iter()
            .find(|(_, e)| e.request_id == request_id)
            .map(|(target, _)| target.clone())
    }

    /// The producer uploaded the bundle. Returns `false` for unknown or
    /// already-resolved requests; the upload is then discarded.
    pub fn complete(&self, request_id: RequestId, bytes: Bytes) -> bool {
        let size = bytes.len();
        let won = self
            .target_of(request_id)
            .is_some_and(|target| self.resolve(&target, request_id, Ok(bytes)));
        if won {
            tracing::info!(%request_id, size_bytes = size, "Retrieval fulfilled");
        } else {
            tracing::warn!(%request_id, size_bytes = size, "Discarding late or unknown bundle");
        }
        won
    }

    /// The producer reported it could not build the bundle.
    pub fn fail(&self, request_id: RequestId, message: String) -> bool {
        let won = self.target_of(request_id).is_some_and(|target| {
            self.resolve(
                &target,
                request_id,
                Err(RetrievalError::ProducerFailed(message.clone())),
            )
        });
        if won {
            tracing::warn!(%request_id, message = %message, "Retrieval failed on producer");
        }
        won
    }

    pub fn snapshot(&self) -> Vec<RetrievalSnapshot> {
        let mut out: Vec<_> = self
            .table()
            .iter()
            .map(|(target, e)| RetrievalSnapshot {
                request_id: e.request_id,
                target: target.clone(),
                state: e.state,
                created_at: e.created_at,
                deadline: e.deadline_at,
                waiters: e.waiters,
            })
            .collect();
        out.sort_by_key(|s| s.created_at);
        out
    }
}

fn lock(table: &Table) -> MutexGuard<'_, HashMap<ConnId, InFlight>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolve the request for `target` if it is still `request_id`.
/// Returns `true` if this call won.
fn resolve_in(table: &Table, target: &str, request_id: RequestId, outcome: Outcome) -> bool {
    let entry = {
        let mut table = lock(table);
        match table.get(target) {
            Some(e) if e.request_id == request_id => table.remove(target),
            _ => None,
        }
    };
    let Some(entry) = entry else {
        return false;
    };
    if let Some(timer) = &entry.timer {
        timer.abort();
    }

    let state = match &outcome {
        Ok(_) => RetrievalState::Fulfilled,
        Err(RetrievalError::RequestTimeout) => RetrievalState::TimedOut,
        Err(_) => RetrievalState::Failed,
    };
    tracing::debug!(%request_id, target = %target, ?state, waiters = entry.waiters, "Retrieval resolved");
    entry.result.send_replace(Some(outcome));
    true
}

impl DisconnectListener for RetrievalOrchestrator {
    fn producer_disconnected(&self, conn_id: &str) {
        let request_id = self.table().get(conn_id).map(|e| e.request_id);
        if let Some(request_id) = request_id {
            if self.resolve(conn_id, request_id, Err(RetrievalError::ProducerDisconnected)) {
                tracing::warn!(%request_id, target = %conn_id, "Retrieval target disconnected");
            }
        }
    }
}
