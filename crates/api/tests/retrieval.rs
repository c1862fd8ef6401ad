//! Tests for the retrieval orchestrator: single-flight, timeout and
//! failure paths.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::body::Bytes;
use axum::extract::ws::Message;
use thermogate_api::config::ConcurrentPolicy;
use thermogate_api::hub::{Hub, Registration, Role};
use thermogate_api::retrieval::{summarize, RetrievalError, RetrievalOrchestrator, RetrievalState};
use thermogate_core::protocol::ProducerCommand;
use thermogate_core::types::RequestId;
use thermogate_db::MemoryTelemetryStore;
use tokio::sync::mpsc;

const TIMEOUT: Duration = Duration::from_secs(30);

fn setup(policy: ConcurrentPolicy) -> (Arc<Hub>, Arc<RetrievalOrchestrator>) {
    let hub = Arc::new(Hub::new(Arc::new(MemoryTelemetryStore::new()), 16));
    let orchestrator = Arc::new(RetrievalOrchestrator::new(Arc::clone(&hub), policy, TIMEOUT));
    let listener = Arc::downgrade(&orchestrator);
    hub.add_disconnect_listener(listener);
    (hub, orchestrator)
}

async fn connect_producer(hub: &Hub, id: &str) -> Registration {
    hub.register(id.to_string(), Role::Producer).await.unwrap()
}

/// Wait for the next fetch command queued for a producer.
async fn next_fetch(rx: &mut mpsc::Receiver<Message>) -> RequestId {
    loop {
        match rx.recv().await {
            Some(Message::Text(text)) => {
                if let Ok(ProducerCommand::FetchFiles { request_id }) =
                    serde_json::from_str(text.as_str())
                {
                    return request_id;
                }
            }
            Some(_) => continue,
            None => panic!("producer queue closed"),
        }
    }
}

async fn wait_for_waiters(orchestrator: &RetrievalOrchestrator, waiters: usize) {
    while orchestrator.snapshot().first().map(|s| s.waiters) != Some(waiters) {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Test: no producer -> immediate failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fails_without_producer() {
    let (_hub, orchestrator) = setup(ConcurrentPolicy::Join);

    let result = orchestrator.trigger().await;

    assert_matches!(result, Err(RetrievalError::NoProducerConnected));
    assert_eq!(summarize(&result).code.as_deref(), Some("no-producer-connected"));
}

// ---------------------------------------------------------------------------
// Test: the uploaded bundle is relayed verbatim
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completes_with_uploaded_bundle() {
    let (hub, orchestrator) = setup(ConcurrentPolicy::Join);
    let mut producer = connect_producer(&hub, "p1").await;

    let task = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.trigger().await }
    });

    let request_id = next_fetch(&mut producer.receiver).await;
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].target, "p1");
    assert_eq!(snapshot[0].state, RetrievalState::AwaitingResponse);

    assert!(orchestrator.complete(request_id, Bytes::from_static(b"PK\x03\x04zip")));

    let bundle = task.await.unwrap().unwrap();
    assert_eq!(bundle.request_id, request_id);
    assert_eq!(&bundle.bytes[..], b"PK\x03\x04zip");
    assert!(orchestrator.snapshot().is_empty());

    // A second upload for the same id is discarded.
    assert!(!orchestrator.complete(request_id, Bytes::from_static(b"late")));
}

// ---------------------------------------------------------------------------
// Test: back-to-back triggers share one device-side fetch (join)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_triggers_join_single_fetch() {
    let (hub, orchestrator) = setup(ConcurrentPolicy::Join);
    let mut producer = connect_producer(&hub, "p1").await;

    let first = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.trigger().await }
    });
    let second = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.trigger().await }
    });

    let request_id = next_fetch(&mut producer.receiver).await;
    wait_for_waiters(&orchestrator, 2).await;
    orchestrator.complete(request_id, Bytes::from_static(b"bundle"));

    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();
    assert_eq!(a.request_id, request_id);
    assert_eq!(b.request_id, request_id);
    assert_eq!(a.bytes, b.bytes);

    // Exactly one command ever reached the producer.
    assert!(producer.receiver.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Test: reject policy fails the second trigger without a second command
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_trigger_rejected_under_reject_policy() {
    let (hub, orchestrator) = setup(ConcurrentPolicy::Reject);
    let mut producer = connect_producer(&hub, "p1").await;

    let first = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.trigger().await }
    });
    let request_id = next_fetch(&mut producer.receiver).await;

    assert_matches!(
        orchestrator.trigger().await,
        Err(RetrievalError::RetrievalInProgress)
    );
    assert!(producer.receiver.try_recv().is_err());

    orchestrator.complete(request_id, Bytes::from_static(b"bundle"));
    assert!(first.await.unwrap().is_ok());
}

// ---------------------------------------------------------------------------
// Test: no response by the deadline -> request-timeout, slot freed
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn times_out_and_frees_slot() {
    let (hub, orchestrator) = setup(ConcurrentPolicy::Join);
    let mut producer = connect_producer(&hub, "p1").await;

    let task = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.trigger().await }
    });
    let stale_id = next_fetch(&mut producer.receiver).await;

    tokio::time::sleep(TIMEOUT + Duration::from_millis(1)).await;
    assert_matches!(task.await.unwrap(), Err(RetrievalError::RequestTimeout));
    assert!(orchestrator.snapshot().is_empty());

    // The late upload is discarded and a fresh request goes out.
    assert!(!orchestrator.complete(stale_id, Bytes::from_static(b"late")));
    let retry = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.trigger().await }
    });
    let fresh_id = next_fetch(&mut producer.receiver).await;
    assert_ne!(fresh_id, stale_id);
    orchestrator.complete(fresh_id, Bytes::from_static(b"ok"));
    assert!(retry.await.unwrap().is_ok());
}

// ---------------------------------------------------------------------------
// Test: the deadline frees the slot even after every caller went away
// ---------------------------------------------------------------------------

async fn abandoned_request_expires(policy: ConcurrentPolicy) {
    let (hub, orchestrator) = setup(policy);
    let mut producer = connect_producer(&hub, "p1").await;

    let abandoned = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.trigger().await }
    });
    let stale_id = next_fetch(&mut producer.receiver).await;
    abandoned.abort();
    assert!(abandoned.await.unwrap_err().is_cancelled());
    assert_eq!(orchestrator.snapshot().len(), 1);

    tokio::time::sleep(TIMEOUT + Duration::from_millis(1)).await;
    assert!(orchestrator.snapshot().is_empty());

    let retry = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.trigger().await }
    });
    let fresh_id = next_fetch(&mut producer.receiver).await;
    assert_ne!(fresh_id, stale_id);
    assert!(orchestrator.complete(fresh_id, Bytes::from_static(b"ok")));
    assert!(retry.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn abandoned_request_expires_under_join_policy() {
    abandoned_request_expires(ConcurrentPolicy::Join).await;
}

#[tokio::test(start_paused = true)]
async fn abandoned_request_expires_under_reject_policy() {
    abandoned_request_expires(ConcurrentPolicy::Reject).await;
}

// ---------------------------------------------------------------------------
// Test: target disconnect fails the request without waiting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn target_disconnect_fails_immediately() {
    let (hub, orchestrator) = setup(ConcurrentPolicy::Join);
    let mut producer = connect_producer(&hub, "p1").await;

    let task = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.trigger().await }
    });
    next_fetch(&mut producer.receiver).await;

    hub.unregister("p1").await;

    assert_matches!(task.await.unwrap(), Err(RetrievalError::ProducerDisconnected));
    assert!(orchestrator.snapshot().is_empty());
}

// ---------------------------------------------------------------------------
// Test: a producer-side failure is distinct from a timeout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn producer_failure_is_reported() {
    let (hub, orchestrator) = setup(ConcurrentPolicy::Join);
    let mut producer = connect_producer(&hub, "p1").await;

    let task = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.trigger().await }
    });
    let request_id = next_fetch(&mut producer.receiver).await;

    assert!(orchestrator.fail(request_id, "source directory missing".to_string()));

    let result = task.await.unwrap();
    assert_matches!(&result, Err(RetrievalError::ProducerFailed(msg)) if msg == "source directory missing");
    let summary = summarize(&result);
    assert!(!summary.ok);
    assert_eq!(summary.code.as_deref(), Some("producer-failed"));
}

// ---------------------------------------------------------------------------
// Test: the longest-connected producer is asked
// ---------------------------------------------------------------------------

#[tokio::test]
async fn targets_oldest_producer() {
    let (hub, orchestrator) = setup(ConcurrentPolicy::Join);
    let mut oldest = connect_producer(&hub, "p1").await;
    let mut newer = connect_producer(&hub, "p2").await;

    let task = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.trigger().await }
    });
    let request_id = next_fetch(&mut oldest.receiver).await;
    assert!(newer.receiver.try_recv().is_err());

    orchestrator.complete(request_id, Bytes::from_static(b"zip"));
    assert!(task.await.unwrap().is_ok());
}
