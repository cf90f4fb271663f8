//! End-to-end ingestion against the in-memory store

use serde_json::{json, Value};
use std::sync::Arc;
use twingest_core::message::DEVICE_ID_SYSTEM_PROPERTY;
use twingest_core::{
    BatchError, BatchReport, EnabledFamilies, EventData, IngestError, IngestOutcome,
    IngestionConfig, IngestionEngine, IngestorKind, JsonPath, MemoryTwinStore, MessageContext,
    SkipReason,
};

const NAMESPACE: &str = "dtmi:com:microsoft:autoingest";

fn config(families: EnabledFamilies) -> IngestionConfig {
    IngestionConfig {
        twin_store_url: "memory://".into(),
        twin_identifiers: JsonPath::parse_list("message.DeviceId;DeviceId").unwrap(),
        event_source_name: Some("plant-hub".into()),
        families,
        ..IngestionConfig::default()
    }
}

fn engine(families: EnabledFamilies) -> (IngestionEngine, Arc<MemoryTwinStore>) {
    let store = Arc::new(MemoryTwinStore::new());
    (IngestionEngine::new(&config(families), store.clone()), store)
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn ctx(value: Value) -> MessageContext {
    MessageContext::from_value(value).unwrap()
}

fn event(value: Value) -> EventData {
    EventData::new(value.to_string())
}

#[tokio::test]
async fn test_generic_message_creates_then_updates() {
    init_logging();
    let (engine, store) = engine(EnabledFamilies::all());

    let first = engine
        .ingest(&ctx(json!({ "message": { "DeviceId": "pump-1", "rpm": 1200 } })))
        .await
        .unwrap();
    let raw = format!("{NAMESPACE}:planthub:pump1");
    assert_eq!(
        first,
        IngestOutcome::Created {
            twin_id: "pump-1".into(),
            model_id: format!("{raw};1").parse().unwrap(),
        }
    );

    let second = engine
        .ingest(&ctx(json!({ "message": { "DeviceId": "pump-1", "rpm": 1300, "temp": -12.1 } })))
        .await
        .unwrap();
    let IngestOutcome::Updated { model_id, operations, .. } = second else {
        panic!("expected an update, got {second:?}");
    };
    assert_eq!(model_id.to_string(), format!("{raw};2"));
    assert_eq!(operations, 1 + 3 * 2);

    let twin = store.twin("pump-1").unwrap();
    assert_eq!(twin.model(), format!("{raw};2"));
    assert_eq!(twin.property_str("rpm"), Some("1300"));
    assert_eq!(twin.property_str("temp"), Some("-12.1"));

    let model = store.model(&format!("{raw};2")).unwrap();
    let declared: Vec<_> = model.property_names().collect();
    assert_eq!(declared, vec!["DeviceId", "rpm", "temp"]);
    assert_eq!(model.display_name, json!("pump-1 Auto Provisioned Model"));
}

#[tokio::test]
async fn test_opc_message_is_routed_to_opc() {
    let (engine, store) = engine(EnabledFamilies::all());

    let outcome = engine
        .ingest(&ctx(json!({
            "NodeId": "ns=2;s=Temperature",
            "ApplicationUri": "urn:LineA:server",
            "DisplayName": "Temperature",
            "Value": { "Value": 71.2, "SourceTimestamp": "2022-02-22T22:22:22Z" },
            "DeviceId": "should-not-matter"
        })))
        .await
        .unwrap();

    let IngestOutcome::Created { twin_id, model_id } = outcome else {
        panic!("expected a creation, got {outcome:?}");
    };
    assert_eq!(twin_id, "LineA/ns=2s=Temperature");
    assert_eq!(model_id.to_string(), format!("{NAMESPACE}:opcnode;1"));

    let twin = store.twin(&twin_id).unwrap();
    assert_eq!(twin.property_str("Value"), Some("71.2"));
    assert_eq!(
        twin.metadata.source_time("Value"),
        Some("2022-02-22T22:22:22Z")
    );
    assert!(!twin.has_property("DeviceId"));
    assert!(store.twin("should-not-matter").is_none());
}

#[tokio::test]
async fn test_twin_iq_message_is_ingested() {
    let (engine, store) = engine(EnabledFamilies::all());

    let outcome = engine
        .ingest(&ctx(json!({
            "Routing": {
                "MessageType": "tiq-ingest-telemetry",
                "TiqTwin": { "Enabled": true, "NodeId": "tiq-7" }
            },
            "Payload": { "MachineId": "M1", "Tag": "Flow", "Value": 3, "UOM": "l/s" }
        })))
        .await
        .unwrap();

    assert!(matches!(outcome, IngestOutcome::Created { .. }));
    let twin = store.twin("tiq-7").unwrap();
    assert_eq!(twin.property_str("DisplayName"), Some("M1-Flow"));
    assert_eq!(twin.property_str("UoM"), Some("l/s"));

    let model = store.model(&format!("{NAMESPACE}:twiniq:sensor;1")).unwrap();
    assert!(model.has_property("TagValidationMin"));
}

#[tokio::test]
async fn test_disabled_family_is_skipped() {
    let (engine, store) = engine(EnabledFamilies {
        generic: true,
        opc: false,
        twin_iq: false,
    });

    let outcome = engine
        .ingest(&ctx(json!({
            "NodeId": "n",
            "ApplicationUri": "urn:a:b",
            "Value": 1,
            "DeviceId": "d"
        })))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        IngestOutcome::Skipped(SkipReason::FamilyDisabled(IngestorKind::Opc))
    );
    assert_eq!(store.twin_count(), 0);
}

#[tokio::test]
async fn test_unmatched_message_needs_generic() {
    let (engine, store) = engine(EnabledFamilies {
        generic: false,
        opc: true,
        twin_iq: true,
    });

    let outcome = engine
        .ingest(&ctx(json!({ "DeviceId": "d", "temp": 1 })))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        IngestOutcome::Skipped(SkipReason::FamilyDisabled(IngestorKind::Generic))
    );
    assert!(store.model_ids().is_empty());
}

#[tokio::test]
async fn test_sentinels_and_missing_ids_are_skipped() {
    let (engine, store) = engine(EnabledFamilies::all());

    let heartbeat = engine
        .ingest(&ctx(json!({ "DeviceId": "d", "Payload": { "SensorId": "Heartbeat" } })))
        .await
        .unwrap();
    assert_eq!(
        heartbeat,
        IngestOutcome::Skipped(SkipReason::Sentinel("Heartbeat".into()))
    );

    let anonymous = engine.ingest(&ctx(json!({ "temp": 1 }))).await.unwrap();
    assert_eq!(
        anonymous,
        IngestOutcome::Skipped(SkipReason::NoTwinId(IngestorKind::Generic))
    );

    assert_eq!(store.stats().create_models, 0);
}

#[tokio::test]
async fn test_single_object_matches_one_element_array() {
    let (single_engine, single_store) = engine(EnabledFamilies::all());
    let (array_engine, array_store) = engine(EnabledFamilies::all());
    let message = json!({ "DeviceId": "d-1", "temp": 20 });

    let single = single_engine
        .ingest_batch(&[event(message.clone())])
        .await
        .unwrap();
    let array = array_engine
        .ingest_batch(&[event(json!([message]))])
        .await
        .unwrap();

    assert_eq!(single, array);
    assert_eq!(
        single,
        BatchReport {
            events: 1,
            messages: 1,
            created: 1,
            updated: 0,
            skipped: 0,
        }
    );

    let a = single_store.twin("d-1").unwrap();
    let b = array_store.twin("d-1").unwrap();
    assert_eq!(a.contents, b.contents);
    assert_eq!(a.model(), b.model());
}

#[tokio::test]
async fn test_batch_uses_system_property_for_twin_id() {
    let (engine, store) = engine(EnabledFamilies::all());
    let event = event(json!([{ "temp": 1 }, { "temp": 2 }]))
        .with_system_property(DEVICE_ID_SYSTEM_PROPERTY, "iot_device_id");

    let report = engine.ingest_batch(&[event]).await.unwrap();

    assert_eq!(report.messages, 2);
    assert_eq!(report.created, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(store.twin("iot_device_id").unwrap().property_str("temp"), Some("2"));
}

#[tokio::test]
async fn test_single_failure_is_raised_as_is() {
    let (engine, store) = engine(EnabledFamilies::all());

    let result = engine
        .ingest_batch(&[
            EventData::new("{ this is not json"),
            event(json!({ "DeviceId": "ok", "temp": 1 })),
        ])
        .await;

    assert!(matches!(
        result,
        Err(BatchError::Single(IngestError::Decode(_)))
    ));
    // The good event still went through
    assert!(store.twin("ok").is_some());
}

#[tokio::test]
async fn test_multiple_failures_are_aggregated() {
    init_logging();
    let (engine, store) = engine(EnabledFamilies::all());
    store.fail_writes_for("bad-1");
    store.fail_writes_for("bad-2");

    let result = engine
        .ingest_batch(&[event(json!([
            { "DeviceId": "bad-1", "v": 1 },
            { "DeviceId": "good", "v": 1 },
            { "DeviceId": "bad-2", "v": 1 }
        ]))])
        .await;

    let Err(BatchError::Aggregate(failures)) = result else {
        panic!("expected an aggregate failure");
    };
    assert_eq!(failures.len(), 2);
    assert!(failures
        .iter()
        .all(|f| matches!(f, IngestError::Twin(_))));
    assert!(store.twin("good").is_some());
}
