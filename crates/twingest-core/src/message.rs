//! Message context - one decoded telemetry item and what the engine needs from it
//!
//! Transport events carry a UTF-8 JSON body holding either a single object or
//! an array of objects. Each object may wrap its payload in a `message`
//! envelope, which is unwrapped before any property inspection.

use crate::error::DecodeError;
use crate::value::{render_invariant, JsonPath};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Transport system property carrying the sending device's identity
pub const DEVICE_ID_SYSTEM_PROPERTY: &str = "iothub-connection-device-id";

const ENVELOPE_KEY: &str = "message";

/// Transport-level properties attached to an event
pub type SystemProperties = HashMap<String, Value>;

/// One transport event as delivered by the ingress
#[derive(Debug, Clone, Default)]
pub struct EventData {
    pub body: Vec<u8>,
    pub system_properties: Arc<SystemProperties>,
}

impl EventData {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            system_properties: Arc::default(),
        }
    }

    /// Attach a system property
    #[must_use]
    pub fn with_system_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Arc::make_mut(&mut self.system_properties).insert(name.into(), value.into());
        self
    }

    /// Decode the body into its message objects
    pub fn decode(&self) -> Result<Vec<Map<String, Value>>, DecodeError> {
        decode_body(&self.body)
    }
}

/// Decode an event body.
///
/// A single object and a one-element array holding that object decode to the
/// same result.
pub fn decode_body(body: &[u8]) -> Result<Vec<Map<String, Value>>, DecodeError> {
    match serde_json::from_slice::<Value>(body)? {
        Value::Object(item) => Ok(vec![item]),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(item) => Ok(item),
                _ => Err(DecodeError::NotAnObject { index }),
            })
            .collect(),
        other => Err(DecodeError::Shape(json_kind(&other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A named property value destined for a twin
#[derive(Debug, Clone, PartialEq)]
pub struct TwinProperty {
    pub name: String,
    pub value: Value,
}

impl TwinProperty {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The string stored in the twin's property bag
    pub fn rendered(&self) -> String {
        render_invariant(&self.value)
    }
}

/// One decoded message, envelope already unwrapped.
///
/// Property names are computed once at construction and keep the message's
/// own key order.
#[derive(Debug, Clone)]
pub struct MessageContext {
    raw: Value,
    enveloped: bool,
    property_names: Vec<String>,
    system_properties: Arc<SystemProperties>,
}

impl MessageContext {
    /// Create a context with no transport properties
    pub fn new(item: Map<String, Value>) -> Self {
        Self::with_system_properties(item, Arc::default())
    }

    /// Create a context carrying the event's system properties
    pub fn with_system_properties(
        item: Map<String, Value>,
        system_properties: Arc<SystemProperties>,
    ) -> Self {
        let envelope = match item.get(ENVELOPE_KEY) {
            Some(Value::Object(inner)) => Some(inner),
            _ => None,
        };
        let property_names = envelope.unwrap_or(&item).keys().cloned().collect();

        Self {
            enveloped: envelope.is_some(),
            raw: Value::Object(item),
            property_names,
            system_properties,
        }
    }

    /// Build from an arbitrary value; only objects are messages
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(item) => Some(Self::new(item)),
            _ => None,
        }
    }

    /// The unwrapped message
    pub fn message(&self) -> &Value {
        if self.enveloped {
            &self.raw[ENVELOPE_KEY]
        } else {
            &self.raw
        }
    }

    /// The item exactly as decoded, envelope included
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn is_enveloped(&self) -> bool {
        self.enveloped
    }

    /// Top-level property of the unwrapped message
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.message().get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Resolve a path against the unwrapped message
    pub fn select(&self, path: &JsonPath) -> Option<&Value> {
        path.select(self.message())
    }

    /// Resolve a path against the unwrapped message, then against the raw
    /// item so envelope-qualified paths such as `message.DeviceId` also work
    pub fn select_with_envelope(&self, path: &JsonPath) -> Option<&Value> {
        self.select(path)
            .or_else(|| self.enveloped.then(|| path.select(&self.raw)).flatten())
    }

    pub fn property_names(&self) -> &[String] {
        &self.property_names
    }

    /// Top-level properties in message key order
    pub fn properties(&self) -> Vec<TwinProperty> {
        self.message()
            .as_object()
            .map(|fields| {
                fields
                    .iter()
                    .map(|(name, value)| TwinProperty::new(name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn system_property(&self, name: &str) -> Option<&Value> {
        self.system_properties.get(name)
    }

    pub fn system_properties(&self) -> &Arc<SystemProperties> {
        &self.system_properties
    }
}
