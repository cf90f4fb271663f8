//! Engine lifecycle

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use twingest_core::{
    BatchError, BatchReport, EventData, IngestionConfig, IngestionEngine, TwinStore,
};

use crate::refresh::spawn_twin_refresh;

/// Delay before the first background twin refresh
pub const FIRST_REFRESH_AFTER: Duration = Duration::from_secs(1);

/// A running ingestion engine and its background refresh task
pub struct Runner {
    engine: Arc<IngestionEngine>,
    shutdown: CancellationToken,
    refresh: Option<JoinHandle<()>>,
}

impl Runner {
    /// Build the engine and start the twin refresh loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &IngestionConfig, store: Arc<dyn TwinStore>) -> Self {
        let engine = Arc::new(IngestionEngine::new(config, store));
        let shutdown = CancellationToken::new();
        let refresh = spawn_twin_refresh(
            Arc::clone(engine.twins()),
            FIRST_REFRESH_AFTER,
            config.twin_refresh_interval,
            shutdown.child_token(),
        );

        info!(
            twin_store = %config.twin_store_url,
            generic = config.families.generic,
            opc = config.families.opc,
            twin_iq = config.families.twin_iq,
            "Ingestion engine started"
        );

        Self {
            engine,
            shutdown,
            refresh: Some(refresh),
        }
    }

    /// Load configuration from the environment, then start
    pub fn from_env(store: Arc<dyn TwinStore>) -> Result<Self> {
        let config =
            IngestionConfig::from_env().context("failed to load ingestion configuration")?;
        Ok(Self::start(&config, store))
    }

    pub async fn ingest_batch(&self, events: &[EventData]) -> Result<BatchReport, BatchError> {
        self.engine.ingest_batch(events).await
    }

    pub fn engine(&self) -> &Arc<IngestionEngine> {
        &self.engine
    }

    /// Stop the refresh loop and wait for it to finish
    pub async fn shutdown(mut self) -> Result<()> {
        self.shutdown.cancel();
        if let Some(refresh) = self.refresh.take() {
            refresh.await.context("twin refresh task failed")?;
        }
        info!("Ingestion engine stopped");
        Ok(())
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
