//! Twingest Core Engine
//!
//! This crate turns schema-less telemetry into digital twin state:
//! - Content-based routing of messages to an ingestion strategy
//! - Twin id resolution per message family
//! - A model cache that provisions and evolves DTDL models on demand
//! - A twin cache with create-or-patch writes and per-property source times

pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod message;
pub mod model;
pub mod patch;
pub mod storage;
pub mod twin;
pub mod value;

pub use cache::{CachedTwin, ModelCache, TwinCache, TwinWrite};
pub use config::{ConfigError, EnabledFamilies, IngestionConfig};
pub use error::{BatchError, DecodeError, IngestError, ModelError, TwinError};
pub use identity::TwinIdProvider;
pub use ingest::{
    BatchReport, IngestOutcome, IngestionEngine, IngestorFactory, IngestorKind, MessageIngestor,
    Route, SkipReason,
};
pub use message::{EventData, MessageContext, TwinProperty};
pub use model::{Model, ModelId, ModelTemplate};
pub use patch::{PatchBuilder, PatchOperation};
pub use storage::{MemoryTwinStore, StoreError, TwinStore};
pub use twin::Twin;
pub use value::JsonPath;
