//! Workspace umbrella crate for docvault.
//!
//! This crate stitches the embedding provider and the document store together so callers can
//! ingest, query and list documents through a single [`DocumentPipeline`].

pub use index::{DistanceMetric, DocumentStore, StoreConfig, StoreError};
pub use semantic::{Embedder, EmbeddingConfig, SemanticError, load_embedder};

use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::{JoinError, spawn_blocking};
use uuid::Uuid;

/// Filename reported for documents whose metadata carries none.
pub const UNKNOWN_FILENAME: &str = "unknown";

/// Errors that can occur while running a pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// An uploaded file is not valid UTF-8.
    #[error("Cannot decode '{filename}'.")]
    Decode { filename: String },
    /// The embedding provider failed.
    #[error("embedding failure: {0}")]
    Embedding(#[from] SemanticError),
    /// The document store failed.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
    /// The query parameters are unusable.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// Anything else, e.g. a panicked blocking task.
    #[error("unexpected failure: {0}")]
    Unknown(String),
}

impl From<JoinError> for PipelineError {
    fn from(err: JoinError) -> Self {
        PipelineError::Unknown(err.to_string())
    }
}

/// Metrics observer for pipeline stages.
pub trait PipelineMetrics: Send + Sync {
    fn record_embedding(&self, latency: Duration, texts: usize, ok: bool);
    fn record_storage(&self, latency: Duration, operation: &'static str, ok: bool);
}

/// One file received for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Outcome of a successful ingest: the generated ids, aligned with the filenames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub ids: Vec<String>,
    pub filenames: Vec<String>,
}

impl IngestReport {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A query hit. `score` is the store's distance, so smaller means more similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub filename: String,
    pub score: f32,
    pub text: String,
}

/// A stored document as exposed by [`DocumentPipeline::list_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub filename: String,
    pub text: String,
}

/// Filename stored in `metadata.filename`, or [`UNKNOWN_FILENAME`] when it is missing or not a
/// string.
pub fn filename_of(metadata: &Value) -> String {
    metadata
        .get("filename")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_FILENAME)
        .to_string()
}

/// Ingest, query and list-all over one embedder and one collection.
///
/// Both handles are built once at startup and shared; the pipeline itself holds no other
/// state. Inference and store transactions run on tokio's blocking pool.
#[derive(Clone)]
pub struct DocumentPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<DocumentStore>,
    metrics: Option<Arc<dyn PipelineMetrics>>,
}

impl DocumentPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<DocumentStore>) -> Self {
        Self {
            embedder,
            store,
            metrics: None,
        }
    }

    /// Install a stage observer.
    pub fn with_metrics(mut self, metrics: Arc<dyn PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Decode, embed and store a batch of uploaded files.
    ///
    /// Decoding happens for every file before anything else, so one undecodable file rejects
    /// the whole batch without writing. The batch is stored with a single upsert.
    pub async fn ingest(&self, files: Vec<UploadedFile>) -> Result<IngestReport, PipelineError> {
        let mut filenames = Vec::with_capacity(files.len());
        let mut texts = Vec::with_capacity(files.len());
        for UploadedFile { filename, content } in files {
            let text = match String::from_utf8(content) {
                Ok(text) => text,
                Err(_) => {
                    tracing::error!(filename = %filename, "cannot decode upload as UTF-8");
                    return Err(PipelineError::Decode { filename });
                }
            };
            tracing::info!(filename = %filename, bytes = text.len(), "file processed");
            filenames.push(filename);
            texts.push(text);
        }

        if texts.is_empty() {
            return Ok(IngestReport::default());
        }

        let ids: Vec<String> = texts.iter().map(|_| Uuid::new_v4().to_string()).collect();
        let (texts, vectors) = self.embed_all(texts).await?;
        tracing::info!(documents = vectors.len(), "document embeddings generated");

        let metadatas: Vec<Value> = filenames
            .iter()
            .map(|filename| json!({ "filename": filename }))
            .collect();
        let store = Arc::clone(&self.store);
        let batch_ids = ids.clone();
        let started = Instant::now();
        let stored = spawn_blocking(move || store.upsert(batch_ids, texts, metadatas, vectors)).await?;
        self.observe_storage(started, "upsert", stored.is_ok());
        if let Err(err) = stored {
            tracing::error!(error = %err, "failed to add documents to the store");
            return Err(err.into());
        }

        tracing::info!(documents = ids.len(), "documents added to the store");
        Ok(IngestReport { ids, filenames })
    }

    /// Return up to `top_k` stored documents nearest to `text`.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<Match>, PipelineError> {
        if top_k == 0 {
            return Err(PipelineError::InvalidQuery(
                "top_k must be at least 1".to_string(),
            ));
        }

        let (_, mut vectors) = self.embed_all(vec![text.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| PipelineError::Unknown("embedder returned no vector".to_string()))?;

        let store = Arc::clone(&self.store);
        let started = Instant::now();
        let found = spawn_blocking(move || store.similarity_query(&vector, top_k)).await?;
        self.observe_storage(started, "query", found.is_ok());
        let found = found.inspect_err(|err| {
            tracing::error!(error = %err, "similarity query failed");
        })?;

        let matches: Vec<Match> = found
            .into_iter()
            .map(|hit| Match {
                filename: filename_of(&hit.metadata),
                score: hit.distance,
                text: hit.text,
            })
            .collect();
        tracing::info!(top_k, results = matches.len(), "query executed");
        Ok(matches)
    }

    /// Every stored document as `{filename, text}`.
    pub async fn list_all(&self) -> Result<Vec<DocumentSummary>, PipelineError> {
        let store = Arc::clone(&self.store);
        let started = Instant::now();
        let listed = spawn_blocking(move || store.list_all()).await?;
        self.observe_storage(started, "list", listed.is_ok());
        let documents: Vec<DocumentSummary> = listed
            .inspect_err(|err| tracing::error!(error = %err, "failed to list documents"))?
            .into_iter()
            .map(|doc| DocumentSummary {
                filename: filename_of(&doc.metadata),
                text: doc.text,
            })
            .collect();
        tracing::info!(documents = documents.len(), "retrieved all documents");
        Ok(documents)
    }

    /// Encode `texts` on the blocking pool, handing the texts back alongside their vectors.
    async fn embed_all(
        &self,
        texts: Vec<String>,
    ) -> Result<(Vec<String>, Vec<Vec<f32>>), PipelineError> {
        let embedder = Arc::clone(&self.embedder);
        let count = texts.len();
        let started = Instant::now();
        let encoded = spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let vectors = embedder.encode_batch(&refs);
            (texts, vectors)
        })
        .await?;

        let (texts, vectors) = encoded;
        if let Some(metrics) = &self.metrics {
            metrics.record_embedding(started.elapsed(), count, vectors.is_ok());
        }
        match vectors {
            Ok(vectors) => Ok((texts, vectors)),
            Err(err) => {
                tracing::error!(error = %err, "error generating embeddings");
                Err(err.into())
            }
        }
    }

    fn observe_storage(&self, started: Instant, operation: &'static str, ok: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_storage(started.elapsed(), operation, ok);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semantic::StubEmbedder;
    use std::sync::Mutex;

    fn pipeline() -> DocumentPipeline {
        let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder::new(&EmbeddingConfig::stub()));
        let store = DocumentStore::open(StoreConfig::in_memory("document_store")).unwrap();
        DocumentPipeline::new(embedder, Arc::new(store))
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        fn dimension(&self) -> usize {
            4
        }

        fn encode(&self, _text: &str) -> Result<Vec<f32>, SemanticError> {
            Err(SemanticError::Inference("session exploded".into()))
        }
    }

    #[test]
    fn filename_defaults_to_unknown() {
        assert_eq!(filename_of(&json!({ "filename": "a.txt" })), "a.txt");
        assert_eq!(filename_of(&json!({})), UNKNOWN_FILENAME);
        assert_eq!(filename_of(&json!({ "filename": 7 })), UNKNOWN_FILENAME);
        assert_eq!(filename_of(&Value::Null), UNKNOWN_FILENAME);
        assert_eq!(filename_of(&json!(["filename"])), UNKNOWN_FILENAME);
    }

    #[test]
    fn decode_error_message_names_the_file() {
        let err = PipelineError::Decode {
            filename: "bad.bin".into(),
        };
        assert_eq!(err.to_string(), "Cannot decode 'bad.bin'.");
    }

    #[tokio::test]
    async fn ingest_assigns_fresh_ids() {
        let pipeline = pipeline();
        let report = pipeline
            .ingest(vec![
                UploadedFile::new("a.txt", "alpha"),
                UploadedFile::new("b.txt", "beta"),
            ])
            .await
            .unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(report.filenames, vec!["a.txt", "b.txt"]);
        assert_ne!(report.ids[0], report.ids[1]);
        assert!(Uuid::parse_str(&report.ids[0]).is_ok());
        assert_eq!(pipeline.store().count().unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_ingest_writes_nothing() {
        let pipeline = pipeline();
        let report = pipeline.ingest(Vec::new()).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(pipeline.store().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn zero_top_k_is_invalid() {
        let pipeline = pipeline();
        assert!(matches!(
            pipeline.query("anything", 0).await,
            Err(PipelineError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn embedding_failure_surfaces_and_stores_nothing() {
        let store = Arc::new(DocumentStore::open(StoreConfig::in_memory("failing")).unwrap());
        let pipeline = DocumentPipeline::new(Arc::new(FailingEmbedder), Arc::clone(&store));

        let err = pipeline
            .ingest(vec![UploadedFile::new("a.txt", "alpha")])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(_)));
        assert_eq!(store.count().unwrap(), 0);

        assert!(matches!(
            pipeline.query("alpha", 5).await,
            Err(PipelineError::Embedding(_))
        ));
    }

    #[derive(Default)]
    struct RecordingMetrics {
        events: Mutex<Vec<String>>,
    }

    impl PipelineMetrics for RecordingMetrics {
        fn record_embedding(&self, _latency: Duration, texts: usize, ok: bool) {
            self.events
                .lock()
                .unwrap()
                .push(format!("embed:{texts}:{ok}"));
        }

        fn record_storage(&self, _latency: Duration, operation: &'static str, ok: bool) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{operation}:{ok}"));
        }
    }

    #[tokio::test]
    async fn metrics_observer_sees_each_stage() {
        let metrics = Arc::new(RecordingMetrics::default());
        let pipeline = pipeline().with_metrics(metrics.clone());

        pipeline
            .ingest(vec![
                UploadedFile::new("a.txt", "alpha"),
                UploadedFile::new("b.txt", "beta"),
            ])
            .await
            .unwrap();
        pipeline.query("alpha", 5).await.unwrap();
        pipeline.list_all().await.unwrap();

        let events = metrics.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["embed:2:true", "upsert:true", "embed:1:true", "query:true", "list:true"]
        );
    }
}
