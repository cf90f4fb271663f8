//! JSON patch construction for twin updates
//!
//! `PatchBuilder` is pure: given the properties of one message and the last
//! known state of the twin it produces the ordered operations that bring the
//! twin up to date and stamp each property with its source time.

use crate::message::TwinProperty;
use crate::model::ModelId;
use crate::twin::Twin;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MODEL_PATH: &str = "/$metadata/$model";
const METADATA_PREFIX: &str = "/$metadata/";
const SOURCE_TIME_SUFFIX: &str = "/sourceTime";

/// One JSON patch operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: String },
    Replace { path: String, value: String },
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Add {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn replace(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Replace {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. } | Self::Replace { path, .. } => path,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Add { value, .. } | Self::Replace { value, .. } => value,
        }
    }

    pub fn target(&self) -> PatchTarget {
        PatchTarget::parse(self.path())
    }
}

/// What a patch path addresses in a twin document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchTarget {
    Model,
    SourceTime(String),
    Property(String),
    Other(String),
}

impl PatchTarget {
    pub fn parse(path: &str) -> Self {
        if path == MODEL_PATH {
            return Self::Model;
        }

        if let Some(name) = path
            .strip_prefix(METADATA_PREFIX)
            .and_then(|rest| rest.strip_suffix(SOURCE_TIME_SUFFIX))
        {
            if !name.contains('/') {
                return Self::SourceTime(unescape(name));
            }
        }

        match path.strip_prefix('/') {
            Some(name) if !name.is_empty() && !name.contains('/') => {
                Self::Property(unescape(name))
            }
            _ => Self::Other(path.to_string()),
        }
    }
}

/// Escape a property name for use as a JSON pointer token
pub fn escape(name: &str) -> String {
    name.replace('~', "~0").replace('/', "~1")
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Patch application failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("cannot replace missing property '{0}'")]
    MissingProperty(String),

    #[error("unsupported patch path '{0}'")]
    UnsupportedPath(String),
}

/// Builds the patch document for an existing twin
pub struct PatchBuilder;

impl PatchBuilder {
    /// Operations for `properties` against `twin`.
    ///
    /// The model pointer is always rewritten first. Each property then gets an
    /// `add` when the twin lacks it, or a `replace` when it has it, followed
    /// by its `sourceTime` stamp.
    pub fn build(
        properties: &[TwinProperty],
        twin: &Twin,
        model_id: &ModelId,
        source_time: &str,
    ) -> Vec<PatchOperation> {
        let mut operations = Vec::with_capacity(1 + properties.len() * 2);
        operations.push(PatchOperation::replace(MODEL_PATH, model_id.to_string()));

        for property in properties {
            let token = escape(&property.name);
            let path = format!("/{token}");
            let value = property.rendered();

            operations.push(if twin.has_property(&property.name) {
                PatchOperation::replace(path, value)
            } else {
                PatchOperation::add(path, value)
            });
            operations.push(PatchOperation::replace(
                format!("{METADATA_PREFIX}{token}{SOURCE_TIME_SUFFIX}"),
                source_time,
            ));
        }

        operations
    }

    /// Apply operations to a twin in place
    pub fn apply(twin: &mut Twin, operations: &[PatchOperation]) -> Result<(), PatchError> {
        for operation in operations {
            let value = operation.value();
            match (operation, operation.target()) {
                (_, PatchTarget::Model) => twin.metadata.model = value.to_string(),
                (_, PatchTarget::SourceTime(name)) => twin.metadata.set_source_time(&name, value),
                (PatchOperation::Replace { .. }, PatchTarget::Property(name))
                    if !twin.has_property(&name) =>
                {
                    return Err(PatchError::MissingProperty(name));
                }
                (_, PatchTarget::Property(name)) => {
                    twin.contents.insert(name, value.into());
                }
                (_, PatchTarget::Other(path)) => return Err(PatchError::UnsupportedPath(path)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_parsing() {
        assert_eq!(PatchTarget::parse("/$metadata/$model"), PatchTarget::Model);
        assert_eq!(
            PatchTarget::parse("/$metadata/a~1b/sourceTime"),
            PatchTarget::SourceTime("a/b".into())
        );
        assert_eq!(
            PatchTarget::parse("/x~0y"),
            PatchTarget::Property("x~y".into())
        );
        assert!(matches!(PatchTarget::parse("/a/b"), PatchTarget::Other(_)));
        assert!(matches!(PatchTarget::parse("a"), PatchTarget::Other(_)));
    }

    #[test]
    fn test_operation_wire_form() {
        let op = PatchOperation::add("/key", "something");
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({ "op": "add", "path": "/key", "value": "something" })
        );
    }

    #[test]
    fn test_apply() {
        let model = ModelId::parse("dtmi:x:f;1").unwrap();
        let mut twin = Twin::new("t", &model);
        let props = vec![TwinProperty::new("a/b", json!(1))];
        let ops = PatchBuilder::build(&props, &twin, &ModelId::parse("dtmi:x:f;2").unwrap(), "T");

        PatchBuilder::apply(&mut twin, &ops).unwrap();
        assert_eq!(twin.model(), "dtmi:x:f;2");
        assert_eq!(twin.property_str("a/b"), Some("1"));
        assert_eq!(twin.metadata.source_time("a/b"), Some("T"));

        let missing = PatchBuilder::apply(&mut twin, &[PatchOperation::replace("/nope", "1")]);
        assert_eq!(missing, Err(PatchError::MissingProperty("nope".into())));
    }
}
