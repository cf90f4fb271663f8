//! Basic example of ingesting telemetry into an in-memory twin store

use serde_json::json;
use std::sync::Arc;
use twingest_core::{EnabledFamilies, EventData, IngestionConfig, IngestionEngine, MemoryTwinStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryTwinStore::new());
    let config = IngestionConfig {
        families: EnabledFamilies::all(),
        event_source_name: Some("demo-hub".into()),
        ..IngestionConfig::default()
    };
    let engine = IngestionEngine::new(&config, store.clone());

    println!("=== Twingest Basic Example ===\n");

    // First reading provisions a model and creates the twin
    let first = EventData::new(
        json!({ "message": { "DeviceId": "boiler-1", "temperature": 71.5 } }).to_string(),
    );
    let report = engine.ingest_batch(&[first]).await?;
    println!("First batch: {report:?}");

    // A new field evolves the model and patches the twin
    let second = EventData::new(
        json!([
            { "message": { "DeviceId": "boiler-1", "temperature": 72.0, "pressure": 1.8 } },
            {
                "NodeId": "ns=2;s=Valve",
                "ApplicationUri": "urn:LineA:opc",
                "Value": { "Value": true }
            }
        ])
        .to_string(),
    );
    let report = engine.ingest_batch(&[second]).await?;
    println!("Second batch: {report:?}");

    println!("\nModels:");
    for id in store.model_ids() {
        println!("  {id}");
    }

    if let Some(twin) = store.twin("boiler-1") {
        println!("\nTwin boiler-1:");
        println!("{}", serde_json::to_string_pretty(&twin)?);
    }

    Ok(())
}
