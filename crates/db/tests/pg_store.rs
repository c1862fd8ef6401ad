//! PostgreSQL round trips. These need a reachable `DATABASE_URL`.

use chrono::{TimeZone, Utc};
use sqlx::PgPool;
use thermogate_core::email::EmailSettings;
use thermogate_core::measurement::Measurement;
use thermogate_core::threshold::ChannelThreshold;
use thermogate_db::models::measurement::{DeleteScope, MeasurementFilter};
use thermogate_db::{PgTelemetryStore, TelemetryStore};

fn scenario() -> Measurement {
    Measurement::new(
        "radix-umx201",
        1759155793.19,
        (1..=8).map(|i| format!("T{i}")).collect(),
        vec![33.6, 33.5, 33.1, 33.2, 33.9, 32.8, 33.9, 33.6],
        vec![336, 335, 331, 332, 339, 328, 339, 336],
    )
    .unwrap()
}

#[ignore = "requires DATABASE_URL"]
#[sqlx::test(migrations = "./migrations")]
async fn measurement_round_trip(pool: PgPool) {
    thermogate_db::health_check(&pool).await.unwrap();
    let store = PgTelemetryStore::new(pool);

    let received_at = Utc.with_ymd_and_hms(2025, 9, 29, 14, 23, 13).unwrap();
    let stored = store
        .insert_measurement(&scenario(), received_at)
        .await
        .unwrap();
    assert_eq!(stored.payload, scenario());

    let rows = store
        .list_measurements(&MeasurementFilter {
            device_id: Some("radix-umx201".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].payload.raw()[5], 328);

    assert_eq!(store.count_measurements().await.unwrap(), 1);
    assert_eq!(
        store
            .delete_measurements(DeleteScope::Oldest(10))
            .await
            .unwrap(),
        1
    );
}

#[ignore = "requires DATABASE_URL"]
#[sqlx::test(migrations = "./migrations")]
async fn threshold_upsert_keeps_last_alert(pool: PgPool) {
    let store = PgTelemetryStore::new(pool);
    let at = Utc.with_ymd_and_hms(2025, 9, 29, 14, 0, 0).unwrap();

    store
        .upsert_threshold(&ChannelThreshold::new("T1", true, 35.0, 300))
        .await
        .unwrap();
    store.record_alert("T1", at).await.unwrap();
    let updated = store
        .upsert_threshold(&ChannelThreshold::new("T1", true, 40.0, 60))
        .await
        .unwrap();

    assert_eq!(updated.limit, 40.0);
    assert_eq!(updated.min_repeat_interval_secs, 60);
    assert_eq!(updated.last_alert_at, Some(at));
}

#[ignore = "requires DATABASE_URL"]
#[sqlx::test(migrations = "./migrations")]
async fn email_settings_upsert_single_row(pool: PgPool) {
    let store = PgTelemetryStore::new(pool.clone());
    assert_eq!(store.email_settings().await.unwrap(), None);

    let mut settings = EmailSettings {
        enabled: true,
        smtp_host: "smtp.example.com".into(),
        smtp_port: 2525,
        username: Some("ops".into()),
        password: Some("s3cret".into()),
        from_address: "alerts@example.com".into(),
        recipients: vec!["a@example.com".into(), "b@example.com".into()],
    };
    store.save_email_settings(&settings).await.unwrap();
    settings.recipients.pop();
    let saved = store.save_email_settings(&settings).await.unwrap();

    assert_eq!(saved, settings);
    assert_eq!(store.email_settings().await.unwrap(), Some(settings));
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM email_config")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}
