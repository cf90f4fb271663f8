//! Generic ingestion: any JSON message naming a device

use super::{sentinel, IngestorKind, Plan, SkipReason, WritePlan};
use crate::config::IngestionConfig;
use crate::identity::TwinIdProvider;
use crate::message::MessageContext;
use crate::model::ModelTemplate;
use crate::value::{format_source_time, parse_timestamp, scalar_string, JsonPath};
use chrono::Utc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GenericIngestor {
    ids: TwinIdProvider,
    model_identifiers: Vec<JsonPath>,
    timestamp_identifiers: Vec<JsonPath>,
    event_source_name: Option<String>,
    namespace: String,
}

impl GenericIngestor {
    pub fn new(config: &IngestionConfig) -> Self {
        Self {
            ids: TwinIdProvider::generic(config.twin_identifiers.clone()),
            model_identifiers: config.model_identifiers.clone(),
            timestamp_identifiers: config.timestamp_identifiers.clone(),
            event_source_name: config.event_source_name.clone(),
            namespace: config.model_namespace.clone(),
        }
    }

    pub fn plan(&self, ctx: &MessageContext) -> Plan {
        let Some(twin_id) = self.ids.resolve(ctx) else {
            return Plan::Skip(SkipReason::NoTwinId(IngestorKind::Generic));
        };
        if let Some(sensor) = sentinel(ctx) {
            return Plan::Skip(SkipReason::Sentinel(sensor));
        }

        let (family, seed) = match self.model_identifier(ctx) {
            Some(model) => (model.clone(), model),
            None => (
                fallback_family(self.event_source_name.as_deref(), &twin_id),
                twin_id.rsplit(':').next().unwrap_or(&twin_id).to_string(),
            ),
        };

        Plan::Write(WritePlan {
            raw_model_id: format!("{}:{family}", self.namespace),
            template: ModelTemplate::auto(&seed),
            properties: ctx.properties(),
            source_time: self.source_time(ctx),
            twin_id,
        })
    }

    fn model_identifier(&self, ctx: &MessageContext) -> Option<String> {
        self.model_identifiers.iter().find_map(|path| {
            let found = ctx
                .select_with_envelope(path)
                .and_then(scalar_string)
                .filter(|s| !s.trim().is_empty())?;
            debug!(path = %path, model = %found, "Found model identifier");
            Some(found)
        })
    }

    /// First configured timestamp that parses, else ingestion time
    fn source_time(&self, ctx: &MessageContext) -> String {
        let now = Utc::now();
        let found = self.timestamp_identifiers.iter().find_map(|path| {
            let parsed = ctx.select_with_envelope(path).and_then(parse_timestamp);
            if parsed.is_none() {
                debug!(path = %path, "No timestamp at path");
            }
            parsed
        });

        match found {
            Some(at) => {
                debug!(
                    source_time = %at,
                    offset_ms = (now - at).num_milliseconds(),
                    "Source timestamp offset"
                );
                format_source_time(at)
            }
            None => format_source_time(now),
        }
    }
}

/// Family token used when a message names no model: the event source and the
/// twin id, lower-cased with dashes removed
fn fallback_family(event_source_name: Option<&str>, twin_id: &str) -> String {
    let normalize = |s: &str| s.replace('-', "").to_lowercase();
    match event_source_name.map(normalize).filter(|s| !s.is_empty()) {
        Some(source) => format!("{source}:{}", normalize(twin_id)),
        None => normalize(twin_id),
    }
}
