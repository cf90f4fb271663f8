//! Model cache with version evolution
//!
//! The cache holds every known model grouped by family (raw model id). While
//! the index is fresh it is authoritative; once its TTL lapses the next
//! access re-lists the whole catalogue from the store and swaps in a new
//! index. Readers always see a complete index, old or new.

use crate::error::ModelError;
use crate::model::{Model, ModelId, ModelTemplate};
use crate::storage::{StoreError, TwinStore};
use arc_swap::ArcSwap;
use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Default time an index stays authoritative
pub const DEFAULT_MODEL_TTL: Duration = Duration::from_secs(5 * 60);

/// Immutable snapshot of the model catalogue
#[derive(Debug, Clone, Default)]
pub struct ModelIndex {
    families: HashMap<String, Vec<Model>>,
    next_refresh: Option<Instant>,
}

impl ModelIndex {
    /// Build the index that replaces `self` after a fetch.
    ///
    /// Models are never deleted, so anything `self` knows that the listing
    /// does not show yet is carried over.
    pub fn refreshed(&self, fetched: Vec<Model>, now: Instant, ttl: Duration) -> Self {
        let mut families: HashMap<String, Vec<Model>> = HashMap::new();
        let carried = self.families.values().flatten().cloned();

        for model in fetched.into_iter().chain(carried) {
            let versions = families.entry(model.id.raw().to_string()).or_default();
            if !versions.iter().any(|m| m.id == model.id) {
                versions.push(model);
            }
        }
        for versions in families.values_mut() {
            versions.sort_by_key(|m| m.id.version());
        }

        Self {
            families,
            next_refresh: Some(now + ttl),
        }
    }

    /// Copy of this index with one more model
    pub fn with_model(&self, model: Model) -> Self {
        let mut next = self.clone();
        let versions = next.families.entry(model.id.raw().to_string()).or_default();
        versions.retain(|m| m.id != model.id);
        versions.push(model);
        versions.sort_by_key(|m| m.id.version());
        next
    }

    /// Copy of this index that is stale immediately
    pub fn expired(&self) -> Self {
        Self {
            families: self.families.clone(),
            next_refresh: None,
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        self.next_refresh.is_some_and(|at| now < at)
    }

    /// Every known version of a family, oldest first
    pub fn versions(&self, raw: &str) -> &[Model] {
        self.families.get(raw).map(Vec::as_slice).unwrap_or_default()
    }

    /// The authoritative (highest) version of a family
    pub fn latest(&self, raw: &str) -> Option<&Model> {
        self.versions(raw).iter().max_by_key(|m| m.id.version())
    }

    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    pub fn model_count(&self) -> usize {
        self.families.values().map(Vec::len).sum()
    }
}

/// Process-wide model cache
pub struct ModelCache {
    store: Arc<dyn TwinStore>,
    ttl: Duration,
    index: ArcSwap<ModelIndex>,
    rebuild: Mutex<()>,
    evolve: Mutex<()>,
}

impl ModelCache {
    pub fn new(store: Arc<dyn TwinStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            index: ArcSwap::from_pointee(ModelIndex::default()),
            rebuild: Mutex::new(()),
            evolve: Mutex::new(()),
        }
    }

    /// The current index, rebuilt first if it has gone stale
    pub async fn current_index(&self) -> Result<Arc<ModelIndex>, ModelError> {
        let index = self.index.load_full();
        if index.is_fresh(Instant::now()) {
            trace!("Model index hit");
            return Ok(index);
        }

        let _guard = self.rebuild.lock().await;

        // Another caller may have rebuilt while we waited
        let index = self.index.load_full();
        if index.is_fresh(Instant::now()) {
            return Ok(index);
        }

        let fetched = self.fetch().await?;
        let rebuilt = Arc::new(index.refreshed(fetched, Instant::now(), self.ttl));
        self.index.store(Arc::clone(&rebuilt));

        info!(
            families = rebuilt.family_count(),
            models = rebuilt.model_count(),
            "Model cache rebuilt"
        );
        Ok(rebuilt)
    }

    async fn fetch(&self) -> Result<Vec<Model>, ModelError> {
        let mut listing = self.store.list_models(true);
        let mut models = Vec::new();

        while let Some(item) = listing.next().await {
            let envelope = item.map_err(ModelError::List)?;
            let Some(dtdl) = envelope.dtdl else {
                warn!(model_id = %envelope.id, "Listed model has no definition, skipping");
                continue;
            };
            match Model::from_dtdl(&dtdl) {
                Ok(model) => models.push(model),
                Err(e) => warn!(model_id = %envelope.id, error = %e, "Undecodable model, skipping"),
            }
        }

        Ok(models)
    }

    /// Every known version of a family, oldest first
    pub async fn models_for(&self, raw: &str) -> Result<Vec<Model>, ModelError> {
        Ok(self.current_index().await?.versions(raw).to_vec())
    }

    /// The highest known version of a family
    pub async fn latest(&self, raw: &str) -> Result<Option<Model>, ModelError> {
        Ok(self.current_index().await?.latest(raw).cloned())
    }

    /// Register a model without waiting for the next refresh
    pub fn register(&self, model: Model) {
        self.index.rcu(|index| index.with_model(model.clone()));
    }

    /// Force the next access to re-list the catalogue
    pub fn invalidate(&self) {
        self.index.rcu(|index| index.expired());
    }

    /// Return the id of a model covering `property_names`, creating the
    /// family's first version or the next version when needed
    pub async fn ensure_model(
        &self,
        raw: &str,
        property_names: &[String],
        template: &ModelTemplate,
    ) -> Result<ModelId, ModelError> {
        if let Some(id) = self.covering_model(raw, property_names).await? {
            return Ok(id);
        }

        let _guard = self.evolve.lock().await;

        let index = self.current_index().await?;
        let now = Utc::now();
        let model = match index.latest(raw) {
            None => Model::provisioned(ModelId::first(raw)?, template, property_names, now),
            Some(current) => {
                let missing = current.missing_properties(property_names);
                if missing.is_empty() {
                    return Ok(current.id.clone());
                }
                debug!(model_id = %current.id, ?missing, "Model lacks properties, evolving");
                current.evolve(&missing, now)?
            }
        };

        self.create(model).await
    }

    async fn covering_model(
        &self,
        raw: &str,
        property_names: &[String],
    ) -> Result<Option<ModelId>, ModelError> {
        let index = self.current_index().await?;
        Ok(index
            .latest(raw)
            .filter(|current| current.missing_properties(property_names).is_empty())
            .map(|current| {
                trace!(model_id = %current.id, "Model covers message");
                current.id.clone()
            }))
    }

    async fn create(&self, model: Model) -> Result<ModelId, ModelError> {
        let id = model.id.clone();
        let dtdl = model.to_dtdl()?;

        match self.store.create_models(&[dtdl]).await {
            Ok(_) => {
                info!(model_id = %id, properties = model.contents.len(), "Created model");
                self.register(model);
                Ok(id)
            }
            Err(source) => {
                if matches!(source, StoreError::Conflict(_)) {
                    warn!(
                        model_id = %id,
                        "Model already exists in store, forcing catalogue refresh"
                    );
                    self.invalidate();
                }
                Err(ModelError::Create {
                    id: id.to_string(),
                    source,
                })
            }
        }
    }
}
