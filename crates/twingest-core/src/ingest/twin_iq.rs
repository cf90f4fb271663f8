//! TwinIQ sensor ingestion

use super::{sentinel, source_time_or_now, IngestorKind, Plan, SkipReason, WritePlan};
use crate::config::IngestionConfig;
use crate::identity::TwinIdProvider;
use crate::message::{MessageContext, TwinProperty};
use crate::model::ModelTemplate;
use crate::value::{scalar_string, JsonPath};
use serde_json::Value;

pub const TWIN_IQ_FAMILY: &str = "twiniq:sensor";

const TWIN_IQ_PROPERTIES: [&str; 7] = [
    "DisplayName",
    "HistoricalTagName",
    "Value",
    "TagValidationMin",
    "TagValidationMax",
    "Timestamp",
    "UoM",
];

#[derive(Debug, Clone)]
pub struct TwinIqIngestor {
    raw_model_id: String,
}

impl TwinIqIngestor {
    pub fn new(config: &IngestionConfig) -> Self {
        Self {
            raw_model_id: format!("{}:{TWIN_IQ_FAMILY}", config.model_namespace),
        }
    }

    pub fn plan(&self, ctx: &MessageContext) -> Plan {
        let Some(twin_id) = TwinIdProvider::TwinIq.resolve(ctx) else {
            return Plan::Skip(SkipReason::NoTwinId(IngestorKind::TwinIq));
        };
        if let Some(sensor) = sentinel(ctx) {
            return Plan::Skip(SkipReason::Sentinel(sensor));
        }

        Plan::Write(WritePlan {
            twin_id,
            raw_model_id: self.raw_model_id.clone(),
            template: ModelTemplate::auto("Twin IQ Sensor Node")
                .with_properties(TWIN_IQ_PROPERTIES),
            properties: project(ctx),
            source_time: source_time_or_now([payload(ctx, "TS"), ctx.get("Timestamp")]),
        })
    }
}

fn payload<'a>(ctx: &'a MessageContext, key: &str) -> Option<&'a Value> {
    ctx.select(&JsonPath::from_keys(["Payload", key]))
}

/// Sensor properties taken from `Payload`
fn project(ctx: &MessageContext) -> Vec<TwinProperty> {
    let tag = payload(ctx, "Tag");
    let machine = payload(ctx, "MachineId").and_then(scalar_string);
    let display_name = match (machine, tag.and_then(scalar_string)) {
        (Some(machine), Some(tag)) => Some(Value::String(format!("{machine}-{tag}"))),
        _ => None,
    };

    [
        ("Value", payload(ctx, "Value").cloned()),
        ("DisplayName", display_name),
        ("HistoricalTagName", tag.cloned()),
        ("Timestamp", payload(ctx, "TS").cloned()),
        ("UoM", payload(ctx, "UOM").cloned()),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.map(|v| TwinProperty::new(name, v)))
    .collect()
}
