//! Message ingestion
//!
//! Every message family is ingested the same way: resolve the twin id, drop
//! sentinels, make sure a model covers the properties to be written, then
//! create or patch the twin. The families differ only in how they build the
//! `WritePlan`.

pub mod batch;
pub mod engine;
pub mod generic;
pub mod opc;
pub mod router;
pub mod twin_iq;

pub use batch::BatchReport;
pub use engine::IngestionEngine;
pub use generic::GenericIngestor;
pub use opc::OpcIngestor;
pub use router::{IngestorFactory, Route};
pub use twin_iq::TwinIqIngestor;

use crate::cache::{ModelCache, TwinCache, TwinWrite};
use crate::error::IngestError;
use crate::message::{MessageContext, TwinProperty};
use crate::model::{ModelId, ModelTemplate};
use crate::value::{format_source_time, parse_timestamp, JsonPath};
use chrono::Utc;
use std::fmt;
use tracing::{debug, error, warn};

const SENTINEL_SENSORS: [&str; 2] = ["Heartbeat", "ModelManager"];

/// Message families, in routing priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestorKind {
    TwinIq,
    Opc,
    Generic,
}

impl fmt::Display for IngestorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TwinIq => "twiniq",
            Self::Opc => "opc",
            Self::Generic => "generic",
        })
    }
}

/// Why a message was dropped without error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoTwinId(IngestorKind),
    /// Heartbeat or model-manager traffic
    Sentinel(String),
    FamilyDisabled(IngestorKind),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTwinId(kind) => write!(f, "no twin id found in {kind} message"),
            Self::Sentinel(sensor) => write!(f, "{sensor} sentinel"),
            Self::FamilyDisabled(kind) => write!(f, "{kind} ingestion is disabled"),
        }
    }
}

/// What happened to one message
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Created {
        twin_id: String,
        model_id: ModelId,
    },
    Updated {
        twin_id: String,
        model_id: ModelId,
        operations: usize,
    },
    Skipped(SkipReason),
}

/// Everything needed to write one message to its twin
#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    pub twin_id: String,
    pub raw_model_id: String,
    pub template: ModelTemplate,
    pub properties: Vec<TwinProperty>,
    pub source_time: String,
}

impl WritePlan {
    pub fn property_names(&self) -> Vec<String> {
        self.properties.iter().map(|p| p.name.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Write(WritePlan),
    Skip(SkipReason),
}

/// One ingestion strategy
#[derive(Debug, Clone)]
pub enum MessageIngestor {
    Generic(GenericIngestor),
    Opc(OpcIngestor),
    TwinIq(TwinIqIngestor),
}

impl MessageIngestor {
    pub fn kind(&self) -> IngestorKind {
        match self {
            Self::Generic(_) => IngestorKind::Generic,
            Self::Opc(_) => IngestorKind::Opc,
            Self::TwinIq(_) => IngestorKind::TwinIq,
        }
    }

    /// Decide what to write without touching the store
    pub fn plan(&self, ctx: &MessageContext) -> Plan {
        match self {
            Self::Generic(ingestor) => ingestor.plan(ctx),
            Self::Opc(ingestor) => ingestor.plan(ctx),
            Self::TwinIq(ingestor) => ingestor.plan(ctx),
        }
    }

    pub async fn ingest(
        &self,
        ctx: &MessageContext,
        models: &ModelCache,
        twins: &TwinCache,
    ) -> Result<IngestOutcome, IngestError> {
        let plan = match self.plan(ctx) {
            Plan::Write(plan) => plan,
            Plan::Skip(reason) => {
                self.log_skip(&reason);
                return Ok(IngestOutcome::Skipped(reason));
            }
        };

        let model_id = models
            .ensure_model(&plan.raw_model_id, &plan.property_names(), &plan.template)
            .await?;

        let written = twins
            .write_twin(&plan.twin_id, &model_id, &plan.properties, &plan.source_time)
            .await?;

        Ok(match written {
            TwinWrite::Created => IngestOutcome::Created {
                twin_id: plan.twin_id,
                model_id,
            },
            TwinWrite::Patched { operations } => IngestOutcome::Updated {
                twin_id: plan.twin_id,
                model_id,
                operations: operations.len(),
            },
        })
    }

    fn log_skip(&self, reason: &SkipReason) {
        match (self.kind(), reason) {
            (IngestorKind::TwinIq, SkipReason::NoTwinId(_)) => {
                error!(kind = %self.kind(), "{reason}")
            }
            (_, SkipReason::NoTwinId(_)) => warn!(kind = %self.kind(), "{reason}"),
            _ => debug!(kind = %self.kind(), "Ignoring message: {reason}"),
        }
    }
}

/// `Payload.SensorId` when it marks heartbeat or model-manager traffic
pub(crate) fn sentinel(ctx: &MessageContext) -> Option<String> {
    ctx.select(&JsonPath::from_keys(["Payload", "SensorId"]))
        .and_then(|v| v.as_str())
        .filter(|sensor| SENTINEL_SENSORS.contains(sensor))
        .map(str::to_string)
}

/// First of `candidates` that parses as a timestamp, else now
pub(crate) fn source_time_or_now<'a, I>(candidates: I) -> String
where
    I: IntoIterator<Item = Option<&'a serde_json::Value>>,
{
    let found = candidates
        .into_iter()
        .flatten()
        .find_map(parse_timestamp)
        .unwrap_or_else(Utc::now);
    format_source_time(found)
}
