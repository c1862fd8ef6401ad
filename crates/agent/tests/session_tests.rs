//! Integration tests for backend command handling and file bundles.

use std::io::Read;
use std::sync::Arc;

use assert_matches::assert_matches;
use thermogate_agent::bundle::{build_bundle, build_bundle_async, BundleSource};
use thermogate_agent::error::BundleError;
use thermogate_agent::session::{handle_command, CommandOutcome, SessionContext};
use thermogate_core::polling::PollInterval;
use thermogate_core::protocol::ProducerMessage;
use tokio::sync::{mpsc, watch};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn context(
    http_url: Option<&str>,
    bundle_source: Option<BundleSource>,
) -> (SessionContext, watch::Receiver<PollInterval>) {
    let (tx, rx) = watch::channel(PollInterval::from_millis(5_000).unwrap());
    let ctx = SessionContext {
        ws_url: "ws://127.0.0.1:1/api/v1/ws/producer".to_string(),
        http_url: http_url.map(str::to_string),
        bundle_source,
        interval: Arc::new(tx),
        http: reqwest::Client::new(),
    };
    (ctx, rx)
}

// ---------------------------------------------------------------------------
// Test: set_interval
// ---------------------------------------------------------------------------

#[tokio::test]
async fn set_interval_updates_poller_interval() {
    let (ctx, rx) = context(None, None);
    let (replies, _reply_rx) = mpsc::channel(1);

    let outcome = handle_command(r#"{"type":"set_interval","interval_ms":1000}"#, &ctx, &replies);

    let expected = PollInterval::from_millis(1_000).unwrap();
    assert_eq!(outcome, CommandOutcome::IntervalChanged(expected));
    assert_eq!(*rx.borrow(), expected);
}

#[tokio::test]
async fn set_interval_below_floor_is_ignored() {
    let (ctx, rx) = context(None, None);
    let (replies, _reply_rx) = mpsc::channel(1);

    let outcome = handle_command(r#"{"type":"set_interval","interval_ms":50}"#, &ctx, &replies);

    assert_eq!(outcome, CommandOutcome::Ignored);
    assert_eq!(rx.borrow().as_millis(), 5_000);
}

#[tokio::test]
async fn unknown_command_is_ignored() {
    let (ctx, _rx) = context(None, None);
    let (replies, _reply_rx) = mpsc::channel(1);

    assert_eq!(handle_command(r#"{"type":"reboot"}"#, &ctx, &replies), CommandOutcome::Ignored);
    assert_eq!(handle_command("not json", &ctx, &replies), CommandOutcome::Ignored);
}

// ---------------------------------------------------------------------------
// Test: fetch_files failures are reported back
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_without_upload_url_replies_retrieval_failed() {
    let (ctx, _rx) = context(None, None);
    let (replies, mut reply_rx) = mpsc::channel(1);
    let request_id = uuid_for_test();

    let outcome = handle_command(
        &format!(r#"{{"type":"fetch_files","request_id":"{request_id}"}}"#),
        &ctx,
        &replies,
    );
    assert_eq!(outcome, CommandOutcome::RetrievalStarted(request_id));

    let reply = reply_rx.recv().await.unwrap();
    assert_matches!(
        reply,
        ProducerMessage::RetrievalFailed { request_id: id, message }
            if id == request_id && message.contains("BACKEND_HTTP_URL")
    );
}

#[tokio::test]
async fn fetch_without_bundle_source_replies_retrieval_failed() {
    let (ctx, _rx) = context(Some("http://127.0.0.1:1"), None);
    let (replies, mut reply_rx) = mpsc::channel(1);
    let request_id = uuid_for_test();

    handle_command(
        &format!(r#"{{"type":"fetch_files","request_id":"{request_id}"}}"#),
        &ctx,
        &replies,
    );

    let reply = reply_rx.recv().await.unwrap();
    assert_matches!(
        reply,
        ProducerMessage::RetrievalFailed { message, .. } if message.contains("BUNDLE_SOURCE_DIR")
    );
}

fn uuid_for_test() -> thermogate_core::types::RequestId {
    "0191d3a4-5b6c-7d8e-9f00-112233445566".parse().unwrap()
}

// ---------------------------------------------------------------------------
// Test: bundle assembly
// ---------------------------------------------------------------------------

#[test]
fn bundle_contains_regular_files_only() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("log_b.csv"), "t,T1\n0,33.6\n").unwrap();
    std::fs::write(dir.path().join("log_a.csv"), "t,T1\n0,21.0\n").unwrap();
    std::fs::create_dir(dir.path().join("archive")).unwrap();
    std::fs::write(dir.path().join("archive").join("old.csv"), "x").unwrap();

    let bytes = build_bundle(dir.path()).unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();

    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(sorted, ["log_a.csv", "log_b.csv"]);

    let mut contents = String::new();
    archive
        .by_name("log_b.csv")
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "t,T1\n0,33.6\n");
}

#[test]
fn empty_directory_yields_empty_archive() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = build_bundle(dir.path()).unwrap();
    let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), 0);
}

#[test]
fn missing_directory_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert_matches!(build_bundle(&missing), Err(BundleError::Io(_)));
}

#[tokio::test]
async fn unconfigured_bundle_source_is_rejected() {
    assert_matches!(build_bundle_async(None).await, Err(BundleError::NotConfigured));
}
