//! The ingestion engine: router plus the shared caches

use super::{BatchReport, IngestOutcome, IngestorFactory, Route, SkipReason};
use crate::cache::{ModelCache, TwinCache};
use crate::config::IngestionConfig;
use crate::error::{BatchError, IngestError};
use crate::message::{EventData, MessageContext};
use crate::storage::TwinStore;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Routes messages and writes them through the model and twin caches
pub struct IngestionEngine {
    factory: IngestorFactory,
    models: Arc<ModelCache>,
    twins: Arc<TwinCache>,
}

impl IngestionEngine {
    pub fn new(config: &IngestionConfig, store: Arc<dyn TwinStore>) -> Self {
        Self {
            factory: IngestorFactory::new(config),
            models: Arc::new(ModelCache::new(Arc::clone(&store), config.model_cache_ttl)),
            twins: Arc::new(TwinCache::new(store)),
        }
    }

    /// Ingest one decoded message
    pub async fn ingest(&self, ctx: &MessageContext) -> Result<IngestOutcome, IngestError> {
        match self.factory.select(ctx) {
            Route::Ingest(ingestor) => ingestor.ingest(ctx, &self.models, &self.twins).await,
            Route::Disabled(kind) => {
                warn!(kind = %kind, "Message family disabled, ignoring message");
                Ok(IngestOutcome::Skipped(SkipReason::FamilyDisabled(kind)))
            }
        }
    }

    /// Ingest every message of every event.
    ///
    /// Events are processed in order and each message fails on its own; the
    /// batch error carries every failure once the whole batch has been seen.
    pub async fn ingest_batch(&self, events: &[EventData]) -> Result<BatchReport, BatchError> {
        let mut report = BatchReport::default();
        let mut failures: Vec<IngestError> = Vec::new();

        for event in events {
            report.events += 1;

            let items = match event.decode() {
                Ok(items) => items,
                Err(e) => {
                    error!(error = %e, "Failed to decode event body");
                    failures.push(e.into());
                    continue;
                }
            };

            for item in items {
                report.messages += 1;
                let ctx = MessageContext::with_system_properties(
                    item,
                    Arc::clone(&event.system_properties),
                );

                match self.ingest(&ctx).await {
                    Ok(outcome) => report.record(&outcome),
                    Err(e) => {
                        error!(error = %e, message = %ctx.message(), "Message ingestion failed");
                        failures.push(e);
                    }
                }
            }
        }

        if let Some(err) = BatchError::from_failures(failures) {
            return Err(err);
        }

        debug!(
            events = report.events,
            messages = report.messages,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            "Batch ingested"
        );
        Ok(report)
    }

    pub fn factory(&self) -> &IngestorFactory {
        &self.factory
    }

    pub fn models(&self) -> &Arc<ModelCache> {
        &self.models
    }

    pub fn twins(&self) -> &Arc<TwinCache> {
        &self.twins
    }
}
