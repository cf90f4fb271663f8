//! OPC UA node ingestion
//!
//! OPC messages are projected onto a fixed property set so every node twin
//! shares one model family.

use super::{sentinel, source_time_or_now, IngestorKind, Plan, SkipReason, WritePlan};
use crate::config::IngestionConfig;
use crate::identity::TwinIdProvider;
use crate::message::{MessageContext, TwinProperty};
use crate::model::ModelTemplate;
use crate::value::JsonPath;

pub const OPC_FAMILY: &str = "opcnode";

const OPC_PROPERTIES: [&str; 5] = [
    "NodeId",
    "DisplayName",
    "Value",
    "ApplicationUri",
    "SourceTimestamp",
];

#[derive(Debug, Clone)]
pub struct OpcIngestor {
    raw_model_id: String,
}

impl OpcIngestor {
    pub fn new(config: &IngestionConfig) -> Self {
        Self {
            raw_model_id: format!("{}:{OPC_FAMILY}", config.model_namespace),
        }
    }

    pub fn plan(&self, ctx: &MessageContext) -> Plan {
        let Some(twin_id) = TwinIdProvider::Opc.resolve(ctx) else {
            return Plan::Skip(SkipReason::NoTwinId(IngestorKind::Opc));
        };
        if let Some(sensor) = sentinel(ctx) {
            return Plan::Skip(SkipReason::Sentinel(sensor));
        }

        Plan::Write(WritePlan {
            twin_id,
            raw_model_id: self.raw_model_id.clone(),
            template: ModelTemplate::auto("OPC Node").with_properties(OPC_PROPERTIES),
            properties: project(ctx),
            source_time: source_time_or_now([
                ctx.select(&JsonPath::from_keys(["Value", "SourceTimestamp"])),
                ctx.get("SourceTimestamp"),
                ctx.get("Timestamp"),
            ]),
        })
    }
}

/// Normalized OPC property set; absent fields are left out
fn project(ctx: &MessageContext) -> Vec<TwinProperty> {
    let nested = |outer: &str, inner: &str| ctx.select(&JsonPath::from_keys([outer, inner]));

    [
        ("NodeId", ctx.get("NodeId")),
        ("Value", nested("Value", "Value").or_else(|| ctx.get("Value"))),
        ("DisplayName", ctx.get("DisplayName")),
        (
            "SourceTimestamp",
            nested("Value", "SourceTimestamp").or_else(|| ctx.get("SourceTimestamp")),
        ),
        ("ApplicationUri", ctx.get("ApplicationUri")),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.map(|v| TwinProperty::new(name, v.clone())))
    .collect()
}
