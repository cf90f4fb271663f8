//! DTDL interface models and their versioned identifiers

use crate::error::ModelError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// DTDL context of every auto-provisioned model
pub const DTDL_CONTEXT: &str = "dtmi:dtdl:context;2";

/// Longest display-name seed kept before the suffix is appended
pub const DISPLAY_NAME_SEED_LIMIT: usize = 30;

const DISPLAY_NAME_SUFFIX: &str = " Auto Provisioned Model";
const STRING_SCHEMA: &str = "string";

/// A versioned model identifier, `<raw>;<version>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId {
    raw: String,
    version: u32,
}

impl ModelId {
    pub fn new(raw: impl Into<String>, version: u32) -> Result<Self, ModelError> {
        let raw = raw.into();
        if raw.is_empty() || raw.contains(';') || version == 0 {
            return Err(ModelError::InvalidId(format!("{raw};{version}")));
        }
        Ok(Self { raw, version })
    }

    /// First version of a family
    pub fn first(raw: &str) -> Result<Self, ModelError> {
        Self::new(raw, 1)
    }

    pub fn parse(id: &str) -> Result<Self, ModelError> {
        let invalid = || ModelError::InvalidId(id.to_string());
        let (raw, version) = id.rsplit_once(';').ok_or_else(invalid)?;
        let version = version.trim().parse::<u32>().map_err(|_| invalid())?;
        Self::new(raw, version).map_err(|_| invalid())
    }

    /// The family identifier without the version
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// The next version of the same family
    pub fn next(&self) -> Result<Self, ModelError> {
        let version = self
            .version
            .checked_add(1)
            .ok_or_else(|| ModelError::InvalidId(self.to_string()))?;
        Ok(Self {
            raw: self.raw.clone(),
            version,
        })
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.raw, self.version)
    }
}

impl FromStr for ModelId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ModelId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ModelId> for String {
    fn from(id: ModelId) -> Self {
        id.to_string()
    }
}

/// One entry of a model's `contents`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelContent {
    #[serde(rename = "@type")]
    pub kind: Value,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelContent {
    /// A string property provisioned at `at`
    pub fn auto_property(name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: json!("Property"),
            name: name.into(),
            schema: Some(json!(STRING_SCHEMA)),
            description: Some(json!(format!(
                "Auto Provisioned Property at {}",
                at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ))),
            extra: Map::new(),
        }
    }
}

/// A DTDL v2 interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    #[serde(rename = "@id")]
    pub id: ModelId,
    #[serde(rename = "@type", default = "interface_kind")]
    pub kind: Value,
    #[serde(rename = "@context", default = "dtdl_context")]
    pub context: Value,
    #[serde(rename = "displayName", default, skip_serializing_if = "Value::is_null")]
    pub display_name: Value,
    #[serde(default)]
    pub contents: Vec<ModelContent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn interface_kind() -> Value {
    json!("Interface")
}

fn dtdl_context() -> Value {
    json!([DTDL_CONTEXT])
}

impl Model {
    /// Synthesize the first model of a family: template properties first, then
    /// any message properties the template lacks
    pub fn provisioned(
        id: ModelId,
        template: &ModelTemplate,
        property_names: &[String],
        at: DateTime<Utc>,
    ) -> Self {
        let mut seen = HashSet::new();
        let contents = template
            .properties
            .iter()
            .chain(property_names)
            .filter(|name| seen.insert(name.as_str()))
            .map(|name| ModelContent::auto_property(name.as_str(), at))
            .collect();

        Self {
            id,
            kind: interface_kind(),
            context: dtdl_context(),
            display_name: json!(template.display_name),
            contents,
            extra: Map::new(),
        }
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.contents.iter().any(|c| c.name == name)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.contents.iter().map(|c| c.name.as_str())
    }

    /// Names this model does not declare, in the order given, without repeats
    pub fn missing_properties(&self, names: &[String]) -> Vec<String> {
        let known: HashSet<&str> = self.property_names().collect();
        let mut seen = HashSet::new();
        names
            .iter()
            .filter(|name| !known.contains(name.as_str()) && seen.insert(name.as_str()))
            .cloned()
            .collect()
    }

    /// Clone into the next version with `missing` appended
    pub fn evolve(&self, missing: &[String], at: DateTime<Utc>) -> Result<Self, ModelError> {
        let mut next = self.clone();
        next.id = self.id.next()?;
        next.contents
            .extend(missing.iter().map(|name| ModelContent::auto_property(name.as_str(), at)));
        Ok(next)
    }

    /// Serialize as a DTDL document
    pub fn to_dtdl(&self) -> Result<String, ModelError> {
        serde_json::to_string_pretty(self).map_err(|source| ModelError::Encode {
            id: self.id.to_string(),
            source,
        })
    }

    pub fn from_dtdl(dtdl: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(dtdl)
    }
}

/// What a family's first model is built from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelTemplate {
    pub display_name: String,
    pub properties: Vec<String>,
}

impl ModelTemplate {
    /// Template named after `seed`, truncated and suffixed
    pub fn auto(seed: &str) -> Self {
        let truncated: String = seed.chars().take(DISPLAY_NAME_SEED_LIMIT).collect();
        Self {
            display_name: format!("{truncated}{DISPLAY_NAME_SUFFIX}"),
            properties: Vec::new(),
        }
    }

    /// Seed the first model with these properties
    #[must_use]
    pub fn with_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties = properties.into_iter().map(Into::into).collect();
        self
    }
}
