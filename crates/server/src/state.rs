use crate::config::ServerConfig;
use crate::telemetry::StageRecorder;
use anyhow::Context;
use docvault::{load_embedder, DocumentPipeline, DocumentStore};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Ingest / query / list pipelines over the shared model and collection
    pub pipeline: DocumentPipeline,

    /// Prometheus exporter handle, when a recorder was installed
    pub prometheus: Option<PrometheusHandle>,
}

impl ServerState {
    /// Load the embedding model and open the collection.
    ///
    /// Failures here are fatal: the server never starts without a working model and store.
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let embedder = load_embedder(&config.embedding)
            .await
            .context("failed to load embedding model")?;

        let store_cfg = config.store.clone();
        let store = tokio::task::spawn_blocking(move || DocumentStore::open(store_cfg))
            .await?
            .with_context(|| {
                format!(
                    "failed to open collection '{}' at {}",
                    config.store.collection,
                    config.store.path.display()
                )
            })?;

        if let Some(stored) = store.dimension()? {
            if stored != embedder.dimension() {
                anyhow::bail!(
                    "collection '{}' holds {stored}-dimensional vectors but model '{}' produces {}",
                    store.collection(),
                    embedder.model_name(),
                    embedder.dimension()
                );
            }
        }

        tracing::info!(
            model = embedder.model_name(),
            collection = store.collection(),
            documents = store.count()?,
            "pipeline ready"
        );

        let mut pipeline = DocumentPipeline::new(embedder, Arc::new(store));
        if config.metrics_enabled {
            pipeline = pipeline.with_metrics(Arc::new(StageRecorder));
        }
        Ok(Self::from_parts(config, pipeline))
    }

    /// Assemble state from an already-built pipeline.
    pub fn from_parts(config: ServerConfig, pipeline: DocumentPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

/// Server metadata for health checks
#[derive(Debug, serde::Serialize)]
pub struct ServerMetadata {
    pub version: String,
    pub uptime_seconds: u64,
}
