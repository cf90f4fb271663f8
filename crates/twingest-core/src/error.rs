//! Error types for the ingestion pipeline
//!
//! Each stage has its own error; `IngestError` is what a single message
//! ingestion returns and `BatchError` is what a whole event batch returns.

use crate::storage::StoreError;
use thiserror::Error;

/// The event body could not be turned into message objects
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("event body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event body must be an object or an array of objects, found {0}")]
    Shape(&'static str),

    #[error("item {index} of the event body is not an object")]
    NotAnObject { index: usize },
}

/// Model catalog failures
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid model id '{0}'")]
    InvalidId(String),

    #[error("failed to list models")]
    List(#[source] StoreError),

    #[error("failed to encode model {id}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to create model {id}")]
    Create {
        id: String,
        #[source]
        source: StoreError,
    },
}

/// Twin read/write failures
#[derive(Debug, Error)]
pub enum TwinError {
    #[error("failed to look up twin {twin_id}")]
    Lookup {
        twin_id: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to create twin {twin_id}")]
    Create {
        twin_id: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to update twin {twin_id}")]
    Update {
        twin_id: String,
        #[source]
        source: StoreError,
    },
}

impl TwinError {
    pub fn twin_id(&self) -> &str {
        match self {
            Self::Lookup { twin_id, .. }
            | Self::Create { twin_id, .. }
            | Self::Update { twin_id, .. } => twin_id,
        }
    }
}

/// Failure of one message (or one undecodable event)
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Twin(#[from] TwinError),
}

/// Failure of a batch.
///
/// A batch with exactly one failure reports that failure as-is; more than one
/// are aggregated.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Single(IngestError),

    #[error("{} messages failed in batch", .0.len())]
    Aggregate(Vec<IngestError>),
}

impl BatchError {
    /// Collapse collected failures; `None` when there were none
    pub fn from_failures(mut failures: Vec<IngestError>) -> Option<Self> {
        match failures.len() {
            0 => None,
            1 => failures.pop().map(Self::Single),
            _ => Some(Self::Aggregate(failures)),
        }
    }

    /// Every underlying failure
    pub fn failures(&self) -> &[IngestError] {
        match self {
            Self::Single(error) => std::slice::from_ref(error),
            Self::Aggregate(errors) => errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn twin_failure(id: &str) -> IngestError {
        TwinError::Update {
            twin_id: id.to_string(),
            source: StoreError::Unavailable("down".into()),
        }
        .into()
    }

    #[test]
    fn test_batch_error_shapes() {
        assert!(BatchError::from_failures(Vec::new()).is_none());

        let single = BatchError::from_failures(vec![twin_failure("a")]).unwrap();
        assert!(matches!(single, BatchError::Single(_)));
        assert_eq!(single.to_string(), "failed to update twin a");

        let many = BatchError::from_failures(vec![twin_failure("a"), twin_failure("b")]).unwrap();
        assert_eq!(many.failures().len(), 2);
        assert_eq!(many.to_string(), "2 messages failed in batch");
    }
}
