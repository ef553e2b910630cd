//! # docvault index
//!
//! A persistent document collection with exact nearest-neighbour search. Each document is an
//! id, its text, a JSON metadata value and a float embedding.
//!
//! ## Core Features
//!
//! - **Pluggable Backends**: storage sits behind the [`StoreBackend`] trait. Out of the box:
//!   - a redb backend for persistent, on-disk collections (the default);
//!   - an in-memory `HashMap` backend for tests.
//! - **Compact records**: records are bincode-encoded and zstd-compressed before they reach
//!   the backend.
//! - **Exact search**: embeddings are mirrored in memory; a query scores every one of them with
//!   the configured [`DistanceMetric`] and reads back only the top `k` records.
//! - **Fixed dimension**: the first write fixes the collection's embedding dimension, which is
//!   persisted with the collection and enforced on every later write and query.
//!
//! ## Example Usage
//!
//! ```
//! use index::{DocumentStore, StoreConfig};
//! use serde_json::json;
//!
//! let store = DocumentStore::open(StoreConfig::in_memory("document_store")).unwrap();
//! store
//!     .upsert(
//!         vec!["doc-1".into()],
//!         vec!["hello world".into()],
//!         vec![json!({ "filename": "hello.txt" })],
//!         vec![vec![1.0, 0.0, 0.0]],
//!     )
//!     .unwrap();
//!
//! let matches = store.similarity_query(&[1.0, 0.0, 0.0], 5).unwrap();
//! assert_eq!(matches[0].id, "doc-1");
//! assert_eq!(matches[0].distance, 0.0);
//! ```

mod backend;
mod query;

pub use backend::{BackendConfig, BackendKind, InMemoryBackend, RedbBackend, StoreBackend, WriteBatch};
pub use query::{DistanceMetric, QueryMatch};

use bincode::config::standard;
use bincode::error::{DecodeError, EncodeError};
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use zstd::{decode_all, encode_all};

mod metadata_serde {
    use serde::de::Error as DeError;
    use serde::ser::Error as SerError;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub(super) fn serialize<S>(value: &Value, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bytes = serde_json::to_vec(value).map_err(SerError::custom)?;
        serializer.serialize_bytes(&bytes)
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        serde_json::from_slice(&bytes).map_err(DeError::custom)
    }
}

/// Bump this value whenever the on-disk `DocumentRecord` layout changes.
pub const STORE_SCHEMA_VERSION: u16 = 1;

const DIMENSION_META_KEY: &str = "dimension";

/// One persisted document.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DocumentRecord {
    /// Schema version for backward compatibility when deserializing.
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    /// Unique id of the document within its collection.
    pub id: String,
    /// Original document text.
    pub text: String,
    /// Arbitrary metadata associated with the document (JSON).
    #[serde(with = "metadata_serde")]
    pub metadata: serde_json::Value,
    /// Embedding of `text`.
    pub embedding: Vec<f32>,
}

const fn default_schema_version() -> u16 {
    STORE_SCHEMA_VERSION
}

/// A stored document as returned by [`DocumentStore::list_all`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDocument {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Value,
}

/// Compression codec options for record storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    /// No compression (useful for debugging).
    None,
    /// Zstd compression (default, good balance of speed and ratio).
    #[default]
    Zstd,
}

/// Compression behavior configuration. Part of the collection format: reopening a collection
/// with a different codec makes its records unreadable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    /// Compression level (1-22 for Zstd, where higher = better compression but slower).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(encode_all(data, self.level)?),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(decode_all(data)?),
        }
    }
}

/// Config for opening a collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend storage kind.
    pub backend: BackendKind,
    /// Database file for the redb backend.
    pub path: PathBuf,
    /// Collection name; several collections can share one database file.
    pub collection: String,
    /// Distance used to rank query results.
    pub metric: DistanceMetric,
    /// Compression settings for stored records.
    pub compression: CompressionConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Redb,
            path: PathBuf::from("./data/docvault.redb"),
            collection: "document_store".into(),
            metric: DistanceMetric::default(),
            compression: CompressionConfig::default(),
        }
    }
}

impl StoreConfig {
    /// An in-memory collection, mostly for tests.
    pub fn in_memory(collection: &str) -> Self {
        Self {
            backend: BackendKind::Memory,
            collection: collection.into(),
            ..Default::default()
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig::from_kind(self.backend, &self.path)
    }
}

/// Errors raised by the document store.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error(
        "length mismatch: {ids} ids, {texts} texts, {metadatas} metadatas, {vectors} vectors"
    )]
    LengthMismatch {
        ids: usize,
        texts: usize,
        metadatas: usize,
        vectors: usize,
    },
    #[error("dimension mismatch: collection expects {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("empty embedding for document {0}")]
    EmptyEmbedding(String),
    #[error("duplicate id in batch: {0}")]
    DuplicateId(String),
    #[error("document id must not be empty")]
    EmptyId,
    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Serialization encode error: {0}")]
    Encode(String),
    #[error("Serialization decode error: {0}")]
    Decode(String),
    #[error("Compression error: {0}")]
    Compression(String),
}

impl From<EncodeError> for StoreError {
    fn from(e: EncodeError) -> Self {
        StoreError::Encode(e.to_string())
    }
}

impl From<DecodeError> for StoreError {
    fn from(e: DecodeError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Compression(e.to_string())
    }
}

impl StoreError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}

/// In-memory mirror of every stored embedding.
#[derive(Default)]
struct VectorCache {
    dimension: Option<usize>,
    entries: HashMap<String, Vec<f32>>,
}

/// A named, persistent collection of documents.
pub struct DocumentStore {
    /// The backend used for storage, abstracted behind a trait.
    backend: Box<dyn StoreBackend>,
    cfg: StoreConfig,
    cache: RwLock<VectorCache>,
}

impl DocumentStore {
    /// Open the configured collection, creating it if absent, and load its vectors.
    pub fn open(cfg: StoreConfig) -> Result<Self, StoreError> {
        let backend = cfg.backend_config().build(&cfg.collection)?;
        Self::with_backend(cfg, backend)
    }

    /// Open a collection on a caller-supplied backend.
    pub fn with_backend(cfg: StoreConfig, backend: Box<dyn StoreBackend>) -> Result<Self, StoreError> {
        let store = Self {
            backend,
            cfg,
            cache: RwLock::new(VectorCache::default()),
        };
        store.warm_cache()?;
        Ok(store)
    }

    fn warm_cache(&self) -> Result<(), StoreError> {
        let mut dimension = match self.backend.get_meta(DIMENSION_META_KEY)? {
            Some(raw) => Some(raw.parse::<usize>().map_err(|e| {
                StoreError::Decode(format!("invalid stored dimension {raw:?}: {e}"))
            })?),
            None => None,
        };

        let mut entries = HashMap::new();
        self.backend.scan(&mut |data: &[u8]| {
            let record = self.decode_record(data)?;
            let expected = *dimension.get_or_insert(record.embedding.len());
            if record.embedding.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    found: record.embedding.len(),
                });
            }
            entries.insert(record.id, record.embedding);
            Ok(())
        })?;

        tracing::info!(
            collection = %self.cfg.collection,
            documents = entries.len(),
            dimension = ?dimension,
            "collection opened"
        );
        *self.write_cache()? = VectorCache { dimension, entries };
        Ok(())
    }

    fn read_cache(&self) -> Result<RwLockReadGuard<'_, VectorCache>, StoreError> {
        self.cache
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))
    }

    fn write_cache(&self) -> Result<RwLockWriteGuard<'_, VectorCache>, StoreError> {
        self.cache
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))
    }

    pub fn collection(&self) -> &str {
        &self.cfg.collection
    }

    pub fn metric(&self) -> DistanceMetric {
        self.cfg.metric
    }

    /// The embedding dimension fixed by the first write, if any.
    pub fn dimension(&self) -> Result<Option<usize>, StoreError> {
        Ok(self.read_cache()?.dimension)
    }

    /// Number of stored documents.
    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.read_cache()?.entries.len())
    }

    /// Insert or update documents keyed by id.
    ///
    /// The four sequences must have equal length. Ids must be non-empty and unique within the
    /// call; an id that is already stored is overwritten. Every vector must match the
    /// collection dimension (or, for the first write, each other). The batch is committed in a
    /// single backend transaction, so either all documents are written or none are.
    pub fn upsert(
        &self,
        ids: Vec<String>,
        texts: Vec<String>,
        metadatas: Vec<serde_json::Value>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<(), StoreError> {
        if ids.len() != texts.len() || ids.len() != metadatas.len() || ids.len() != vectors.len() {
            return Err(StoreError::LengthMismatch {
                ids: ids.len(),
                texts: texts.len(),
                metadatas: metadatas.len(),
                vectors: vectors.len(),
            });
        }
        if ids.is_empty() {
            return Ok(());
        }

        // Writers hold the cache lock for the whole call so the dimension check and the commit
        // cannot interleave with another writer.
        let mut cache = self.write_cache()?;

        let mut seen = HashSet::with_capacity(ids.len());
        let mut dimension = cache.dimension;
        for (id, vector) in ids.iter().zip(&vectors) {
            if id.is_empty() {
                return Err(StoreError::EmptyId);
            }
            if !seen.insert(id.as_str()) {
                return Err(StoreError::DuplicateId(id.clone()));
            }
            if vector.is_empty() {
                return Err(StoreError::EmptyEmbedding(id.clone()));
            }
            let expected = *dimension.get_or_insert(vector.len());
            if vector.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    found: vector.len(),
                });
            }
        }

        let records: Vec<DocumentRecord> = ids
            .into_iter()
            .zip(texts)
            .zip(metadatas)
            .zip(vectors)
            .map(|(((id, text), metadata), embedding)| DocumentRecord {
                schema_version: STORE_SCHEMA_VERSION,
                id,
                text,
                metadata,
                embedding,
            })
            .collect();

        let mut batch = WriteBatch::default();
        batch.records.reserve(records.len());
        for record in &records {
            batch
                .records
                .push((record.id.clone(), self.encode_record(record)?));
        }
        if cache.dimension.is_none() {
            if let Some(dim) = dimension {
                batch
                    .meta
                    .push((DIMENSION_META_KEY.to_string(), dim.to_string()));
            }
        }

        self.backend.write_batch(batch)?;

        let written = records.len();
        cache.dimension = dimension;
        for record in records {
            cache.entries.insert(record.id, record.embedding);
        }
        tracing::debug!(
            collection = %self.cfg.collection,
            written,
            total = cache.entries.len(),
            "upsert committed"
        );
        Ok(())
    }

    /// Retrieve a record by id.
    pub fn get(&self, id: &str) -> Result<Option<DocumentRecord>, StoreError> {
        match self.backend.get(id)? {
            Some(data) => Ok(Some(self.decode_record(&data)?)),
            None => Ok(None),
        }
    }

    /// Every stored document, in backend order. No pagination.
    pub fn list_all(&self) -> Result<Vec<StoredDocument>, StoreError> {
        let mut documents = Vec::new();
        self.backend.scan(&mut |data: &[u8]| {
            let record = self.decode_record(data)?;
            documents.push(StoredDocument {
                id: record.id,
                text: record.text,
                metadata: record.metadata,
            });
            Ok(())
        })?;
        Ok(documents)
    }

    /// Flush backend buffers if supported.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.backend.flush()
    }

    /// Decodes and decompresses a record from the backend.
    fn decode_record(&self, data: &[u8]) -> Result<DocumentRecord, StoreError> {
        let decompressed = self.cfg.compression.decompress(data)?;
        let (record, _) = decode_from_slice(&decompressed, standard())?;
        Ok(record)
    }

    /// Encodes and compresses a record for storage in the backend.
    fn encode_record(&self, rec: &DocumentRecord) -> Result<Vec<u8>, StoreError> {
        let encoded = encode_to_vec(rec, standard())?;
        self.cfg.compression.compress(&encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory_store() -> DocumentStore {
        DocumentStore::open(StoreConfig::in_memory("test")).unwrap()
    }

    fn one(id: &str, text: &str, vector: Vec<f32>) -> (Vec<String>, Vec<String>, Vec<serde_json::Value>, Vec<Vec<f32>>) {
        (
            vec![id.to_string()],
            vec![text.to_string()],
            vec![json!({ "filename": format!("{id}.txt") })],
            vec![vector],
        )
    }

    #[test]
    fn upsert_then_get_roundtrip() {
        let store = memory_store();
        let (ids, texts, metas, vecs) = one("doc-a", "alpha", vec![1.0, 2.0, 3.0]);
        store.upsert(ids, texts, metas, vecs).unwrap();

        let fetched = store.get("doc-a").unwrap().expect("record exists");
        assert_eq!(fetched.text, "alpha");
        assert_eq!(fetched.metadata, json!({ "filename": "doc-a.txt" }));
        assert_eq!(fetched.embedding, vec![1.0, 2.0, 3.0]);
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.dimension().unwrap(), Some(3));
    }

    #[test]
    fn upsert_rejects_unequal_lengths() {
        let store = memory_store();
        let err = store
            .upsert(
                vec!["a".into(), "b".into()],
                vec!["x".into()],
                vec![json!({}), json!({})],
                vec![vec![1.0], vec![2.0]],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::LengthMismatch { ids: 2, texts: 1, .. }));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn upsert_rejects_duplicate_ids_in_batch() {
        let store = memory_store();
        let err = store
            .upsert(
                vec!["a".into(), "a".into()],
                vec!["x".into(), "y".into()],
                vec![json!({}), json!({})],
                vec![vec![1.0], vec![2.0]],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn upsert_rejects_empty_id_and_empty_vector() {
        let store = memory_store();
        let (_, texts, metas, vecs) = one("x", "t", vec![1.0]);
        assert!(matches!(
            store.upsert(vec![String::new()], texts, metas, vecs),
            Err(StoreError::EmptyId)
        ));

        let (ids, texts, metas, _) = one("x", "t", vec![]);
        assert!(matches!(
            store.upsert(ids, texts, metas, vec![vec![]]),
            Err(StoreError::EmptyEmbedding(_))
        ));
    }

    #[test]
    fn first_write_fixes_dimension() {
        let store = memory_store();
        let (ids, texts, metas, vecs) = one("a", "t", vec![1.0, 0.0]);
        store.upsert(ids, texts, metas, vecs).unwrap();

        let (ids, texts, metas, vecs) = one("b", "t", vec![1.0, 0.0, 0.0]);
        let err = store.upsert(ids, texts, metas, vecs).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch { expected: 2, found: 3 }
        ));

        let err = store.similarity_query(&[1.0], 5).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[test]
    fn mixed_dimensions_in_one_batch_write_nothing() {
        let store = memory_store();
        let err = store
            .upsert(
                vec!["a".into(), "b".into()],
                vec!["x".into(), "y".into()],
                vec![json!({}), json!({})],
                vec![vec![1.0, 0.0], vec![1.0]],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.dimension().unwrap(), None);
    }

    #[test]
    fn upsert_overwrites_existing_id() {
        let store = memory_store();
        let (ids, texts, metas, vecs) = one("a", "first", vec![1.0, 0.0]);
        store.upsert(ids, texts, metas, vecs).unwrap();
        let (ids, texts, metas, vecs) = one("a", "second", vec![0.0, 1.0]);
        store.upsert(ids, texts, metas, vecs).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get("a").unwrap().unwrap().text, "second");
        let hit = &store.similarity_query(&[0.0, 1.0], 1).unwrap()[0];
        assert_eq!(hit.distance, 0.0);
    }

    #[test]
    fn similarity_query_orders_nearest_first() {
        let store = memory_store();
        store
            .upsert(
                vec!["far".into(), "near".into(), "mid".into()],
                vec!["far".into(), "near".into(), "mid".into()],
                vec![json!({}), json!({}), json!({})],
                vec![vec![10.0, 0.0], vec![1.0, 0.0], vec![3.0, 0.0]],
            )
            .unwrap();

        let matches = store.similarity_query(&[0.0, 0.0], 2).unwrap();
        let ids: Vec<_> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!((matches[0].distance - 1.0).abs() < 1e-6);
        assert!((matches[1].distance - 9.0).abs() < 1e-6);
    }

    #[test]
    fn similarity_query_returns_fewer_than_k_without_padding() {
        let store = memory_store();
        let (ids, texts, metas, vecs) = one("only", "t", vec![1.0, 1.0]);
        store.upsert(ids, texts, metas, vecs).unwrap();

        assert_eq!(store.similarity_query(&[0.0, 0.0], 5).unwrap().len(), 1);
        assert!(store.similarity_query(&[0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn empty_store_queries_and_lists_empty() {
        let store = memory_store();
        assert!(store.similarity_query(&[0.5; 4], 5).unwrap().is_empty());
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn list_all_returns_every_document() {
        let store = memory_store();
        store
            .upsert(
                vec!["a".into(), "b".into()],
                vec!["alpha".into(), "beta".into()],
                vec![json!({"filename": "a.txt"}), json!({"filename": "b.txt"})],
                vec![vec![1.0], vec![2.0]],
            )
            .unwrap();

        let mut texts: Vec<_> = store.list_all().unwrap().into_iter().map(|d| d.text).collect();
        texts.sort();
        assert_eq!(texts, vec!["alpha", "beta"]);
    }

    #[test]
    fn uncompressed_codec_roundtrips() {
        let cfg = StoreConfig {
            compression: CompressionConfig {
                codec: CompressionCodec::None,
                level: 0,
            },
            ..StoreConfig::in_memory("plain")
        };
        let store = DocumentStore::open(cfg).unwrap();
        let (ids, texts, metas, vecs) = one("a", "plain text", vec![0.25]);
        store.upsert(ids, texts, metas, vecs).unwrap();
        assert_eq!(store.get("a").unwrap().unwrap().text, "plain text");
    }

    #[test]
    fn redb_collection_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StoreConfig {
            path: dir.path().join("data").join("docvault.redb"),
            ..StoreConfig::default()
        };
        {
            let store = DocumentStore::open(cfg.clone()).unwrap();
            store
                .upsert(
                    vec!["a".into(), "b".into()],
                    vec!["alpha".into(), "beta".into()],
                    vec![json!({"filename": "a.txt"}), json!({"filename": "b.txt"})],
                    vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                )
                .unwrap();
        }

        let reopened = DocumentStore::open(cfg).unwrap();
        assert_eq!(reopened.count().unwrap(), 2);
        assert_eq!(reopened.dimension().unwrap(), Some(2));
        let hit = &reopened.similarity_query(&[0.0, 1.0], 1).unwrap()[0];
        assert_eq!(hit.id, "b");
        assert_eq!(hit.metadata, json!({"filename": "b.txt"}));

        let (ids, texts, metas, vecs) = one("c", "gamma", vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            reopened.upsert(ids, texts, metas, vecs),
            Err(StoreError::DimensionMismatch { expected: 2, found: 3 })
        ));
    }

    #[test]
    fn invalid_collection_name_is_rejected() {
        assert!(matches!(
            DocumentStore::open(StoreConfig::in_memory("no spaces")),
            Err(StoreError::InvalidCollection(_))
        ));
    }

    #[test]
    fn store_config_deserializes_with_defaults() {
        let cfg: StoreConfig =
            serde_json::from_str(r#"{"backend":"memory","metric":"cosine"}"#).unwrap();
        assert_eq!(cfg.backend, BackendKind::Memory);
        assert_eq!(cfg.metric, DistanceMetric::Cosine);
        assert_eq!(cfg.collection, "document_store");
        assert_eq!(cfg.compression, CompressionConfig::default());
    }
}
