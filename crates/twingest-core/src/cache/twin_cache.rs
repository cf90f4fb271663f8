//! Twin cache and the create-or-patch write path
//!
//! The cache is a side cache over the store: it remembers the last snapshot
//! of each twin it has seen, or that the twin is known not to exist. A
//! background task calls `refresh_all` periodically; patches do not update
//! the cached snapshot.

use crate::error::TwinError;
use crate::message::TwinProperty;
use crate::model::ModelId;
use crate::patch::{PatchBuilder, PatchOperation};
use crate::storage::TwinStore;
use crate::twin::Twin;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Default interval between background refreshes
pub const DEFAULT_TWIN_REFRESH: Duration = Duration::from_secs(10 * 60);

/// What the cache knows about a twin
#[derive(Debug, Clone, PartialEq)]
pub enum CachedTwin {
    Present(Arc<Twin>),
    /// The store confirmed the twin does not exist
    Absent,
}

impl CachedTwin {
    /// Same cache entry, not just equal contents
    fn is_same(&self, other: &CachedTwin) -> bool {
        match (self, other) {
            (Self::Present(a), Self::Present(b)) => Arc::ptr_eq(a, b),
            (Self::Absent, Self::Absent) => true,
            _ => false,
        }
    }
}

/// Result of writing a message's properties to a twin
#[derive(Debug, Clone, PartialEq)]
pub enum TwinWrite {
    Created,
    Patched { operations: Vec<PatchOperation> },
}

pub struct TwinCache {
    store: Arc<dyn TwinStore>,
    entries: DashMap<String, CachedTwin>,
}

impl TwinCache {
    pub fn new(store: Arc<dyn TwinStore>) -> Self {
        Self {
            store,
            entries: DashMap::new(),
        }
    }

    /// Cached state of a twin, asking the store on first sight
    pub async fn lookup(&self, twin_id: &str) -> Result<CachedTwin, TwinError> {
        if let Some(entry) = self.peek(twin_id) {
            trace!(twin_id, "Twin cache hit");
            return Ok(entry);
        }

        let entry = self.load(twin_id).await?;
        self.entries.insert(twin_id.to_string(), entry.clone());
        Ok(entry)
    }

    /// Cached state without touching the store
    pub fn peek(&self, twin_id: &str) -> Option<CachedTwin> {
        self.entries.get(twin_id).map(|e| e.value().clone())
    }

    async fn load(&self, twin_id: &str) -> Result<CachedTwin, TwinError> {
        match self.store.get_twin(twin_id).await {
            Ok(twin) => Ok(CachedTwin::Present(Arc::new(twin))),
            Err(e) if e.is_not_found() => {
                debug!(twin_id, "Twin not found in store");
                Ok(CachedTwin::Absent)
            }
            Err(source) => Err(TwinError::Lookup {
                twin_id: twin_id.to_string(),
                source,
            }),
        }
    }

    /// Ids of every twin the cache tracks
    pub fn tracked(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-read every tracked twin. Entries whose reload fails keep their old
    /// state, and entries written or evicted while their reload was in flight
    /// keep the newer state. Returns how many were refreshed.
    pub async fn refresh_all(&self) -> usize {
        let mut refreshed = 0;
        for twin_id in self.tracked() {
            let Some(before) = self.peek(&twin_id) else {
                continue;
            };
            let entry = match self.load(&twin_id).await {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(twin_id = %twin_id, error = %e, "Twin refresh failed");
                    continue;
                }
            };

            match self.entries.get_mut(&twin_id) {
                Some(mut current) if current.is_same(&before) => {
                    *current = entry;
                    refreshed += 1;
                }
                _ => trace!(twin_id = %twin_id, "Twin changed during refresh"),
            }
        }
        debug!(refreshed, tracked = self.entries.len(), "Twin cache refreshed");
        refreshed
    }

    /// Create the twin if it is absent, otherwise patch it
    pub async fn write_twin(
        &self,
        twin_id: &str,
        model_id: &ModelId,
        properties: &[TwinProperty],
        source_time: &str,
    ) -> Result<TwinWrite, TwinError> {
        match self.lookup(twin_id).await? {
            CachedTwin::Absent => {
                let twin = Twin::materialize(twin_id, model_id, properties, source_time);
                let stored = self
                    .store
                    .create_or_replace_twin(twin_id, &twin)
                    .await
                    .map_err(|source| TwinError::Create {
                        twin_id: twin_id.to_string(),
                        source,
                    })?;
                self.entries
                    .insert(twin_id.to_string(), CachedTwin::Present(Arc::new(stored)));
                info!(twin_id, model_id = %model_id, "Created twin");
                Ok(TwinWrite::Created)
            }
            CachedTwin::Present(twin) => {
                let operations = PatchBuilder::build(properties, &twin, model_id, source_time);
                // The returned snapshot is not cached; refresh picks it up
                if let Err(source) = self.store.update_twin(twin_id, &operations).await {
                    if source.is_not_found() {
                        // Deleted behind our back; look it up again next time
                        self.entries.remove(twin_id);
                    }
                    return Err(TwinError::Update {
                        twin_id: twin_id.to_string(),
                        source,
                    });
                }
                debug!(twin_id, operations = operations.len(), "Patched twin");
                Ok(TwinWrite::Patched { operations })
            }
        }
    }
}
