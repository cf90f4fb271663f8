//! In-memory twin store for testing and development

use super::{ModelEnvelope, ModelStream, StoreError, TwinStore};
use crate::model::Model;
use crate::patch::{PatchBuilder, PatchOperation};
use crate::twin::Twin;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub list_models: u64,
    pub create_models: u64,
    pub get_twin: u64,
    pub create_or_replace_twin: u64,
    pub update_twin: u64,
}

#[derive(Default)]
struct Counters {
    list_models: AtomicU64,
    create_models: AtomicU64,
    get_twin: AtomicU64,
    create_or_replace_twin: AtomicU64,
    update_twin: AtomicU64,
}

/// In-memory twin store (non-persistent).
///
/// Enforces what a real store enforces: model ids are unique, a twin's model
/// must exist and every twin property must be declared by that model.
#[derive(Clone, Default)]
pub struct MemoryTwinStore {
    models: Arc<DashMap<String, String>>,
    twins: Arc<DashMap<String, Twin>>,
    etag_counter: Arc<AtomicU64>,
    counters: Arc<Counters>,
    unavailable: Arc<AtomicBool>,
    failing_twins: Arc<DashSet<String>>,
}

impl MemoryTwinStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a model document as-is, bypassing validation
    pub fn insert_raw_model(&self, id: impl Into<String>, dtdl: impl Into<String>) {
        self.models.insert(id.into(), dtdl.into());
    }

    /// Store a twin as-is, bypassing validation
    pub fn insert_twin(&self, mut twin: Twin) {
        twin.etag = Some(self.next_etag());
        self.twins.insert(twin.id.clone(), twin);
    }

    pub fn model(&self, id: &str) -> Option<Model> {
        self.models
            .get(id)
            .and_then(|dtdl| Model::from_dtdl(dtdl.value()).ok())
    }

    pub fn model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.models.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn twin(&self, id: &str) -> Option<Twin> {
        self.twins.get(id).map(|t| t.clone())
    }

    pub fn twin_count(&self) -> usize {
        self.twins.len()
    }

    /// Make every operation fail with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make writes to one twin fail with `Rejected`
    pub fn fail_writes_for(&self, twin_id: impl Into<String>) {
        self.failing_twins.insert(twin_id.into());
    }

    pub fn stats(&self) -> StoreStats {
        let c = &self.counters;
        StoreStats {
            list_models: c.list_models.load(Ordering::Relaxed),
            create_models: c.create_models.load(Ordering::Relaxed),
            get_twin: c.get_twin.load(Ordering::Relaxed),
            create_or_replace_twin: c.create_or_replace_twin.load(Ordering::Relaxed),
            update_twin: c.update_twin.load(Ordering::Relaxed),
        }
    }

    fn next_etag(&self) -> String {
        let n = self.etag_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("W/\"{n}\"")
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }

    fn check_writable(&self, twin_id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        if self.failing_twins.contains(twin_id) {
            return Err(StoreError::Rejected(format!("writes to '{twin_id}' are refused")));
        }
        Ok(())
    }

    fn validate(&self, twin: &Twin) -> Result<(), StoreError> {
        let model = self.model(twin.model()).ok_or_else(|| {
            StoreError::Rejected(format!("model '{}' does not exist", twin.model()))
        })?;

        match twin.property_names().find(|name| !model.has_property(name)) {
            Some(name) => Err(StoreError::Rejected(format!(
                "property '{name}' is not declared by model '{}'",
                model.id
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TwinStore for MemoryTwinStore {
    fn list_models(&self, include_definition: bool) -> ModelStream<'_> {
        self.counters.list_models.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.check_available() {
            return stream::once(async move { Err(e) }).boxed();
        }

        let envelopes: Vec<_> = self
            .models
            .iter()
            .map(|entry| {
                Ok(ModelEnvelope {
                    id: entry.key().clone(),
                    dtdl: include_definition.then(|| entry.value().clone()),
                })
            })
            .collect();
        stream::iter(envelopes).boxed()
    }

    async fn create_models(&self, dtdl: &[String]) -> Result<Vec<ModelEnvelope>, StoreError> {
        self.counters.create_models.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;

        let mut batch = HashSet::new();
        let mut parsed = Vec::with_capacity(dtdl.len());
        for document in dtdl {
            let model = Model::from_dtdl(document)
                .map_err(|e| StoreError::Rejected(format!("invalid model document: {e}")))?;
            let id = model.id.to_string();
            if self.models.contains_key(&id) || !batch.insert(id.clone()) {
                return Err(StoreError::Conflict(format!("model '{id}' already exists")));
            }
            parsed.push((id, document.clone()));
        }

        Ok(parsed
            .into_iter()
            .map(|(id, document)| {
                self.models.insert(id.clone(), document.clone());
                ModelEnvelope {
                    id,
                    dtdl: Some(document),
                }
            })
            .collect())
    }

    async fn get_twin(&self, id: &str) -> Result<Twin, StoreError> {
        self.counters.get_twin.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        self.twin(id).ok_or_else(|| StoreError::twin_not_found(id))
    }

    async fn create_or_replace_twin(&self, id: &str, twin: &Twin) -> Result<Twin, StoreError> {
        self.counters
            .create_or_replace_twin
            .fetch_add(1, Ordering::Relaxed);
        self.check_writable(id)?;
        self.validate(twin)?;

        let mut stored = twin.clone();
        stored.id = id.to_string();
        stored.etag = Some(self.next_etag());
        self.twins.insert(id.to_string(), stored.clone());
        Ok(stored)
    }

    async fn update_twin(
        &self,
        id: &str,
        operations: &[PatchOperation],
    ) -> Result<Twin, StoreError> {
        self.counters.update_twin.fetch_add(1, Ordering::Relaxed);
        self.check_writable(id)?;

        let mut twin = self.twin(id).ok_or_else(|| StoreError::twin_not_found(id))?;
        PatchBuilder::apply(&mut twin, operations)
            .map_err(|e| StoreError::Rejected(e.to_string()))?;
        self.validate(&twin)?;

        twin.etag = Some(self.next_etag());
        self.twins.insert(id.to_string(), twin.clone());
        Ok(twin)
    }
}
