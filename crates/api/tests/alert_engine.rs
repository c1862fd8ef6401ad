//! Tests for threshold re-arm, configuration writes and the staleness
//! watchdog.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{TimeDelta, Utc};
use thermogate_api::alerts::AlertEngine;
use thermogate_api::background::staleness_watchdog;
use thermogate_api::hub::{Hub, Role};
use thermogate_api::polling::PollingControl;
use thermogate_core::alert::{AlertContext, AlertKind};
use thermogate_core::polling::PollInterval;
use thermogate_core::staleness::{StalenessPolicy, WatchdogState};
use thermogate_core::threshold::{ThresholdState, ThresholdUpdate};
use thermogate_db::{MemoryTelemetryStore, TelemetryStore};
use tokio_util::sync::CancellationToken;

use common::{measurement, try_next_json};

const EXPECTED_INTERVAL: Duration = Duration::from_millis(5_000);

fn engine_with_grace(grace: Duration) -> (Arc<AlertEngine>, Arc<MemoryTelemetryStore>) {
    let store = Arc::new(MemoryTelemetryStore::new());
    let engine = Arc::new(AlertEngine::new(store.clone(), StalenessPolicy { grace }));
    (engine, store)
}

fn update(channel: &str, enabled: bool, limit: f64, repeat_secs: u64) -> ThresholdUpdate {
    ThresholdUpdate {
        channel: channel.to_string(),
        enabled,
        limit,
        min_repeat_interval_secs: repeat_secs,
    }
}

// ---------------------------------------------------------------------------
// Test: re-arm is time based (45 fires, 46 @ +10s silent, 46 @ +65s fires)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn threshold_rearms_after_repeat_interval() {
    let (engine, _) = engine_with_grace(Duration::from_secs(10));
    engine.upsert_threshold(&update("T1", true, 40.0, 60)).await.unwrap();
    let t0 = Utc::now();

    let first = engine.evaluate_at(&measurement(&[45.0]), t0).await;
    assert_eq!(first.len(), 1);
    assert_matches!(
        &first[0].context,
        AlertContext::Threshold { channel, value, limit, .. }
            if channel == "T1" && *value == 45.0 && *limit == 40.0
    );

    let second = engine
        .evaluate_at(&measurement(&[46.0]), t0 + TimeDelta::seconds(10))
        .await;
    assert!(second.is_empty());

    let third = engine
        .evaluate_at(&measurement(&[46.0]), t0 + TimeDelta::seconds(65))
        .await;
    assert_eq!(third.len(), 1);
}

// ---------------------------------------------------------------------------
// Test: ties, disabled channels and unknown channels never fire
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ties_disabled_and_unconfigured_channels_are_silent() {
    let (engine, _) = engine_with_grace(Duration::from_secs(10));
    engine.upsert_threshold(&update("T1", true, 40.0, 60)).await.unwrap();
    engine.upsert_threshold(&update("T2", false, 10.0, 60)).await.unwrap();

    // T1 == limit, T2 disabled, T3 has no configuration.
    let alerts = engine
        .evaluate_at(&measurement(&[40.0, 90.0, 90.0]), Utc::now())
        .await;
    assert!(alerts.is_empty());
}

// ---------------------------------------------------------------------------
// Test: each channel re-arms independently
// ---------------------------------------------------------------------------

#[tokio::test]
async fn channels_are_independent() {
    let (engine, _) = engine_with_grace(Duration::from_secs(10));
    engine.upsert_threshold(&update("T1", true, 40.0, 60)).await.unwrap();
    engine.upsert_threshold(&update("T2", true, 40.0, 60)).await.unwrap();
    let t0 = Utc::now();

    assert_eq!(engine.evaluate_at(&measurement(&[41.0, 10.0]), t0).await.len(), 1);
    let later = engine
        .evaluate_at(&measurement(&[41.0, 41.0]), t0 + TimeDelta::seconds(5))
        .await;
    assert_eq!(later.len(), 1);
    assert_matches!(&later[0].context, AlertContext::Threshold { channel, .. } if channel == "T2");
}

// ---------------------------------------------------------------------------
// Test: concurrent evaluations of one channel fire at most once
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_evaluations_fire_once() {
    let (engine, _) = engine_with_grace(Duration::from_secs(10));
    engine.upsert_threshold(&update("T1", true, 40.0, 60)).await.unwrap();
    let now = Utc::now();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.evaluate_at(&measurement(&[50.0]), now).await.len() })
        })
        .collect();

    let mut fired = 0;
    for handle in handles {
        fired += handle.await.unwrap();
    }
    assert_eq!(fired, 1);
}

// ---------------------------------------------------------------------------
// Test: firing is persisted and survives a reconfiguration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconfiguration_keeps_firing_history() {
    let (engine, store) = engine_with_grace(Duration::from_secs(10));
    engine.upsert_threshold(&update("T1", true, 40.0, 60)).await.unwrap();
    let t0 = Utc::now();
    engine.evaluate_at(&measurement(&[45.0]), t0).await;

    let stored = store.list_thresholds().await.unwrap();
    assert_eq!(stored[0].last_alert_at, Some(t0));

    let view = engine.upsert_threshold(&update("T1", true, 42.0, 60)).await.unwrap();
    assert_eq!(view.threshold.limit, 42.0);
    assert_eq!(view.threshold.last_alert_at, Some(t0));
    assert_eq!(view.state, ThresholdState::Alerting);

    // Still inside the repeat window under the new limit.
    let again = engine
        .evaluate_at(&measurement(&[50.0]), t0 + TimeDelta::seconds(30))
        .await;
    assert!(again.is_empty());
}

// ---------------------------------------------------------------------------
// Test: a rejected write leaves the previous configuration in place
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_threshold_write_is_rejected() {
    let (engine, store) = engine_with_grace(Duration::from_secs(10));
    engine.upsert_threshold(&update("T1", true, 40.0, 60)).await.unwrap();

    assert!(engine.upsert_threshold(&update("T1", true, f64::NAN, 60)).await.is_err());
    assert!(engine.upsert_threshold(&update("  ", true, 10.0, 60)).await.is_err());

    let live = engine.thresholds().await;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].threshold.limit, 40.0);
    assert_eq!(store.list_thresholds().await.unwrap()[0].limit, 40.0);
}

// ---------------------------------------------------------------------------
// Test: 53s of silence (limit 52s) raises exactly one stale alert
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn staleness_fires_once_and_clears() {
    let (engine, _) = engine_with_grace(Duration::from_millis(47_000));

    tokio::time::advance(Duration::from_millis(50_000)).await;
    assert!(engine.check_staleness(EXPECTED_INTERVAL).is_none());

    tokio::time::advance(Duration::from_millis(3_000)).await;
    let alert = engine.check_staleness(EXPECTED_INTERVAL).unwrap();
    assert_eq!(alert.kind, AlertKind::StaleData);
    assert_matches!(
        alert.context,
        AlertContext::Staleness { elapsed_ms: 53_000, expected_interval_ms: 5_000, .. }
    );
    assert_eq!(engine.watchdog_state(), WatchdogState::Stale);

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(engine.check_staleness(EXPECTED_INTERVAL).is_none());

    engine.record_measurement(Utc::now());
    assert_eq!(engine.watchdog_state(), WatchdogState::Healthy);
    assert!(engine.last_measurement_at().is_some());
    assert!(engine.check_staleness(EXPECTED_INTERVAL).is_none());
}

// ---------------------------------------------------------------------------
// Test: a check racing a fresh measurement never leaves the device stale
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn check_racing_measurement_settles_healthy() {
    for _ in 0..200 {
        let (engine, _) = engine_with_grace(Duration::from_millis(1_000));
        tokio::time::advance(Duration::from_secs(60)).await;

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let checker = tokio::task::spawn_blocking({
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            move || {
                barrier.wait();
                engine.check_staleness(EXPECTED_INTERVAL)
            }
        });
        let recorder = tokio::task::spawn_blocking({
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            move || {
                barrier.wait();
                engine.record_measurement(Utc::now());
            }
        });
        let alert = checker.await.unwrap();
        recorder.await.unwrap();

        // Either the check ran first and the measurement cleared it, or
        // the measurement ran first and the check saw a fresh clock.
        assert_eq!(engine.watchdog_state(), WatchdogState::Healthy);
        if let Some(alert) = alert {
            assert_matches!(
                alert.context,
                AlertContext::Staleness { elapsed_ms, .. } if elapsed_ms >= 60_000
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Test: the watchdog task publishes one stale alert to consumers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn watchdog_task_publishes_stale_alert() {
    let (engine, store) = engine_with_grace(Duration::from_millis(47_000));
    let hub = Arc::new(Hub::new(store, 16));
    let polling = Arc::new(PollingControl::new(PollInterval::from_millis(5_000).unwrap()));
    let mut consumer = hub.register("c1".into(), Role::Consumer).await.unwrap();
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(staleness_watchdog::run(
        Arc::clone(&engine),
        Arc::clone(&hub),
        polling,
        Duration::from_secs(5),
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_secs(90)).await;
    cancel.cancel();
    handle.await.unwrap();

    let frame = try_next_json(&mut consumer.receiver).unwrap();
    assert_eq!(frame["type"], "alert");
    assert_eq!(frame["kind"], "stale_data");
    assert!(frame["last_data_at"].is_string());
    assert!(try_next_json(&mut consumer.receiver).is_none());
}
