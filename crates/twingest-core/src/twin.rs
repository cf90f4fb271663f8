//! Twin documents as held by the twin store
//!
//! A twin is a property bag bound to one model version, with per-property
//! metadata recording when each value was observed at the source.

use crate::message::TwinProperty;
use crate::model::ModelId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const SOURCE_TIME_KEY: &str = "sourceTime";

/// The `$metadata` section of a twin
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TwinMetadata {
    #[serde(rename = "$model")]
    pub model: String,
    /// Per-property metadata objects, plus whatever else the store keeps here
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl TwinMetadata {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            properties: Map::new(),
        }
    }

    /// `sourceTime` recorded for a property
    pub fn source_time(&self, property: &str) -> Option<&str> {
        self.properties.get(property)?.get(SOURCE_TIME_KEY)?.as_str()
    }

    pub fn set_source_time(&mut self, property: &str, source_time: &str) {
        let entry = self
            .properties
            .entry(property.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(fields) = entry {
            fields.insert(SOURCE_TIME_KEY.to_string(), json!(source_time));
        }
    }
}

/// A twin in store document form
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Twin {
    #[serde(rename = "$dtId")]
    pub id: String,
    /// Concurrency token assigned by the store
    #[serde(rename = "$etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(rename = "$metadata")]
    pub metadata: TwinMetadata,
    /// Property bag
    #[serde(flatten)]
    pub contents: Map<String, Value>,
}

impl Twin {
    pub fn new(id: impl Into<String>, model: &ModelId) -> Self {
        Self {
            id: id.into(),
            etag: None,
            metadata: TwinMetadata::new(model.to_string()),
            contents: Map::new(),
        }
    }

    /// Build a new twin holding `properties`, each stamped with `source_time`
    pub fn materialize(
        id: impl Into<String>,
        model: &ModelId,
        properties: &[TwinProperty],
        source_time: &str,
    ) -> Self {
        let mut twin = Self::new(id, model);
        for property in properties {
            twin.contents
                .insert(property.name.clone(), Value::String(property.rendered()));
            twin.metadata.set_source_time(&property.name, source_time);
        }
        twin
    }

    pub fn model(&self) -> &str {
        &self.metadata.model
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.contents.contains_key(name)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.contents.get(name)
    }

    /// Property value as stored, when it is a string
    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.property(name)?.as_str()
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.contents.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize() {
        let model = ModelId::parse("dtmi:x:fam;2").unwrap();
        let twin = Twin::materialize(
            "dev-1",
            &model,
            &[
                TwinProperty::new("temp", json!(-12.1)),
                TwinProperty::new("ok", json!(true)),
            ],
            "2022-02-22T22:22:22Z",
        );

        assert_eq!(twin.model(), "dtmi:x:fam;2");
        assert_eq!(twin.property_str("temp"), Some("-12.1"));
        assert_eq!(twin.property_str("ok"), Some("true"));
        assert_eq!(
            twin.metadata.source_time("temp"),
            Some("2022-02-22T22:22:22Z")
        );
        assert_eq!(twin.metadata.source_time("missing"), None);
    }

    #[test]
    fn test_document_form() {
        let model = ModelId::parse("dtmi:x:fam;1").unwrap();
        let twin = Twin::materialize("t1", &model, &[TwinProperty::new("a", "1")], "T");
        let doc = serde_json::to_value(&twin).unwrap();

        assert_eq!(
            doc,
            json!({
                "$dtId": "t1",
                "$metadata": { "$model": "dtmi:x:fam;1", "a": { "sourceTime": "T" } },
                "a": "1"
            })
        );

        let mut back: Twin = serde_json::from_value(doc).unwrap();
        assert_eq!(back, twin);

        back.etag = Some("W/\"1\"".into());
        let doc = serde_json::to_value(&back).unwrap();
        assert_eq!(doc["$etag"], "W/\"1\"");
    }
}
