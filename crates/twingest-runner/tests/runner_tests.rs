//! Lifecycle tests for the runner

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use twingest_core::storage::TwinStore;
use twingest_core::{
    CachedTwin, EnabledFamilies, EventData, IngestionConfig, MemoryTwinStore, ModelId, Twin,
    TwinProperty,
};
use twingest_runner::{init_tracing, Runner};

fn config() -> IngestionConfig {
    IngestionConfig {
        twin_store_url: "memory://".into(),
        twin_identifiers: vec!["DeviceId".parse().unwrap()],
        families: EnabledFamilies::all(),
        twin_refresh_interval: Duration::from_secs(600),
        ..IngestionConfig::default()
    }
}

fn cached_temp(runner: &Runner, twin_id: &str) -> Option<String> {
    match runner.engine().twins().peek(twin_id) {
        Some(CachedTwin::Present(twin)) => twin.property_str("temp").map(str::to_string),
        _ => None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_refresh_runs_after_first_tick() {
    let store = Arc::new(MemoryTwinStore::new());
    let runner = Runner::start(&config(), store.clone());

    let report = runner
        .ingest_batch(&[EventData::new(json!({ "DeviceId": "d-1", "temp": 1 }).to_string())])
        .await
        .unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(cached_temp(&runner, "d-1").as_deref(), Some("1"));

    // Another writer changes the twin; the cache has not seen it yet
    let model: ModelId = store.twin("d-1").unwrap().model().parse().unwrap();
    let changed = Twin::materialize("d-1", &model, &[TwinProperty::new("temp", json!(9))], "T");
    store.create_or_replace_twin("d-1", &changed).await.unwrap();
    assert_eq!(cached_temp(&runner, "d-1").as_deref(), Some("1"));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(cached_temp(&runner, "d-1").as_deref(), Some("9"));

    runner.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_refresh_repeats_on_interval() {
    let store = Arc::new(MemoryTwinStore::new());
    let runner = Runner::start(&config(), store.clone());

    runner
        .ingest_batch(&[EventData::new(json!({ "DeviceId": "d-1", "temp": 1 }).to_string())])
        .await
        .unwrap();
    let lookups = store.stats().get_twin;

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(store.stats().get_twin, lookups + 1);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(store.stats().get_twin, lookups + 1);

    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(store.stats().get_twin, lookups + 2);

    runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_refresh() {
    let store = Arc::new(MemoryTwinStore::new());
    let runner = Runner::start(&config(), store);

    tokio::time::timeout(Duration::from_secs(5), runner.shutdown())
        .await
        .expect("shutdown should not hang")
        .unwrap();
}

#[tokio::test]
async fn test_from_env() {
    std::env::set_var("INGESTION_TWIN_URL", "https://twins.example.net");
    std::env::set_var("INGESTION_GENERIC_ENABLED", "true");

    let runner = Runner::from_env(Arc::new(MemoryTwinStore::new())).unwrap();
    let report = runner
        .ingest_batch(&[EventData::new(
            json!({ "message": { "DeviceId": "env-device", "v": 1 } }).to_string(),
        )])
        .await
        .unwrap();
    assert_eq!(report.created, 1);

    runner.shutdown().await.unwrap();
}

#[test]
fn test_tracing_installs_once() {
    assert!(init_tracing(false).is_ok());
    assert!(init_tracing(true).is_err());
}
