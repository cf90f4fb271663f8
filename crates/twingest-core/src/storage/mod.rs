//! Twin store client seam
//!
//! The engine consumes the twin store through five operations. The network
//! client lives outside this crate; `MemoryTwinStore` is the in-process
//! implementation used for tests and demos.

pub mod memory_store;

pub use memory_store::{MemoryTwinStore, StoreStats};

use crate::patch::PatchOperation;
use crate::twin::Twin;
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// One model as listed by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEnvelope {
    pub id: String,
    /// The DTDL document, present when the listing asked for definitions
    pub dtdl: Option<String>,
}

/// Twin store failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("twin store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn twin_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "twin",
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Stream of listed models
pub type ModelStream<'a> = BoxStream<'a, Result<ModelEnvelope, StoreError>>;

/// Operations the engine needs from a twin store
#[async_trait]
pub trait TwinStore: Send + Sync {
    /// List every model, optionally with its DTDL definition
    fn list_models(&self, include_definition: bool) -> ModelStream<'_>;

    /// Upload DTDL documents
    async fn create_models(&self, dtdl: &[String]) -> Result<Vec<ModelEnvelope>, StoreError>;

    /// Fetch a twin; a missing twin is `StoreError::NotFound`
    async fn get_twin(&self, id: &str) -> Result<Twin, StoreError>;

    async fn create_or_replace_twin(&self, id: &str, twin: &Twin) -> Result<Twin, StoreError>;

    /// Apply a patch unconditionally and return the updated twin
    async fn update_twin(
        &self,
        id: &str,
        operations: &[PatchOperation],
    ) -> Result<Twin, StoreError>;
}
