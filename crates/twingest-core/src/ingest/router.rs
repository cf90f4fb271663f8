//! Content-based routing of messages to an ingestor

use super::{GenericIngestor, IngestorKind, MessageIngestor, OpcIngestor, TwinIqIngestor};
use crate::config::{EnabledFamilies, IngestionConfig};
use crate::message::MessageContext;
use serde_json::Value;

const TWIN_IQ_MESSAGE_TYPE: &str = "tiq-ingest-telemetry";

/// Where a message goes
#[derive(Debug, Clone, Copy)]
pub enum Route<'a> {
    Ingest(&'a MessageIngestor),
    /// The message belongs to a family that is switched off
    Disabled(IngestorKind),
}

/// Picks exactly one ingestor per message
#[derive(Debug, Clone)]
pub struct IngestorFactory {
    enabled: EnabledFamilies,
    generic: MessageIngestor,
    opc: MessageIngestor,
    twin_iq: MessageIngestor,
}

impl IngestorFactory {
    pub fn new(config: &IngestionConfig) -> Self {
        Self {
            enabled: config.families,
            generic: MessageIngestor::Generic(GenericIngestor::new(config)),
            opc: MessageIngestor::Opc(OpcIngestor::new(config)),
            twin_iq: MessageIngestor::TwinIq(TwinIqIngestor::new(config)),
        }
    }

    /// Family of a message by content alone, TwinIQ first, then OPC, then
    /// generic
    pub fn classify(ctx: &MessageContext) -> IngestorKind {
        if is_twin_iq(ctx) {
            IngestorKind::TwinIq
        } else if is_opc(ctx) {
            IngestorKind::Opc
        } else {
            IngestorKind::Generic
        }
    }

    pub fn select(&self, ctx: &MessageContext) -> Route<'_> {
        let kind = Self::classify(ctx);
        if self.is_enabled(kind) {
            Route::Ingest(self.ingestor(kind))
        } else {
            Route::Disabled(kind)
        }
    }

    pub fn is_enabled(&self, kind: IngestorKind) -> bool {
        match kind {
            IngestorKind::TwinIq => self.enabled.twin_iq,
            IngestorKind::Opc => self.enabled.opc,
            IngestorKind::Generic => self.enabled.generic,
        }
    }

    pub fn ingestor(&self, kind: IngestorKind) -> &MessageIngestor {
        match kind {
            IngestorKind::TwinIq => &self.twin_iq,
            IngestorKind::Opc => &self.opc,
            IngestorKind::Generic => &self.generic,
        }
    }
}

fn is_twin_iq(ctx: &MessageContext) -> bool {
    let Some(routing) = ctx.get("Routing").and_then(Value::as_object) else {
        return false;
    };
    let message_type = routing.get("MessageType").and_then(Value::as_str);
    let enabled = routing
        .get("TiqTwin")
        .and_then(|twin| twin.get("Enabled"))
        .is_some_and(is_true);

    message_type == Some(TWIN_IQ_MESSAGE_TYPE) && enabled
}

fn is_true(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn is_opc(ctx: &MessageContext) -> bool {
    ["NodeId", "ApplicationUri", "Value"]
        .iter()
        .all(|key| ctx.contains_key(key))
        || ctx.contains_key("DataSetClassId")
}
