//! Twin id resolution per message family

use crate::message::{MessageContext, DEVICE_ID_SYSTEM_PROPERTY};
use crate::value::{scalar_string, JsonPath};

/// Twin-id path used when none is configured
pub const DEFAULT_TWIN_IDENTIFIER: &str = "message.DeviceId";

/// Extracts the id of the twin a message belongs to
#[derive(Debug, Clone, PartialEq)]
pub enum TwinIdProvider {
    /// Configured paths in order, then the transport's device id
    Generic { identifiers: Vec<JsonPath> },
    /// `NodeId` (or `Id`), optionally namespaced by the application URI
    Opc,
    /// `Routing.TiqTwin.NodeId`
    TwinIq,
}

impl TwinIdProvider {
    /// Generic provider; an empty path list falls back to the default path
    pub fn generic(identifiers: Vec<JsonPath>) -> Self {
        if identifiers.is_empty() {
            return Self::default_generic();
        }
        Self::Generic { identifiers }
    }

    pub fn default_generic() -> Self {
        Self::Generic {
            identifiers: vec![JsonPath::from_keys(["message", "DeviceId"])],
        }
    }

    /// Resolve the twin id, `None` when the message names no twin
    pub fn resolve(&self, ctx: &MessageContext) -> Option<String> {
        match self {
            Self::Generic { identifiers } => identifiers
                .iter()
                .find_map(|path| ctx.select_with_envelope(path).and_then(non_empty))
                .or_else(|| ctx.system_property(DEVICE_ID_SYSTEM_PROPERTY).and_then(non_empty)),
            Self::Opc => resolve_opc(ctx),
            Self::TwinIq => ctx
                .select(&JsonPath::from_keys(["Routing", "TiqTwin", "NodeId"]))
                .and_then(non_empty),
        }
    }
}

fn non_empty(value: &serde_json::Value) -> Option<String> {
    scalar_string(value).filter(|s| !s.trim().is_empty())
}

fn resolve_opc(ctx: &MessageContext) -> Option<String> {
    let node_id = ctx
        .get("NodeId")
        .or_else(|| ctx.get("Id"))
        .and_then(scalar_string)?;
    let node_id: String = node_id
        .chars()
        .filter(|c| *c != ';' && !c.is_whitespace())
        .collect();
    if node_id.is_empty() {
        return None;
    }

    let namespace = ctx
        .get("ApplicationUri")
        .and_then(scalar_string)
        .and_then(|uri| uri.split(':').nth(1).map(str::to_string))
        .filter(|segment| !segment.is_empty());

    Some(match namespace {
        Some(segment) => format!("{segment}/{node_id}"),
        None => node_id,
    })
}
