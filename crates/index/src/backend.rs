use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// A set of record and metadata writes applied in one transaction.
#[derive(Debug, Default)]
pub struct WriteBatch {
    /// Encoded document records keyed by document id.
    pub records: Vec<(String, Vec<u8>)>,
    /// Collection-level metadata entries (e.g. the fixed embedding dimension).
    pub meta: Vec<(String, String)>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.meta.is_empty()
    }
}

/// Key-value storage for one collection.
/// This allows for different storage implementations (in-memory, redb).
pub trait StoreBackend: Send + Sync {
    /// Retrieve an encoded record by id.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Apply every write in `batch` atomically.
    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError>;
    /// Scan all encoded records, calling the visitor for each one.
    fn scan(
        &self,
        visitor: &mut dyn FnMut(&[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
    /// Read a collection metadata entry.
    fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Flush any buffered writes to durable storage.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Which backend a collection lives in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Redb file on local disk. The default.
    #[default]
    Redb,
    /// Process-local `HashMap`; contents vanish with the process. Useful for tests.
    Memory,
}

/// Configuration for selecting and building a backend.
///
/// # Example
/// ```
/// use index::BackendConfig;
///
/// let config = BackendConfig::in_memory();
/// let backend = config.build("document_store").unwrap();
/// ```
#[derive(Clone, Debug, Default)]
pub enum BackendConfig {
    /// Use Redb for storage at `path`.
    Redb { path: PathBuf },
    /// Use an in-memory HashMap for storage.
    #[default]
    InMemory,
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn redb<P: Into<PathBuf>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    pub fn from_kind(kind: BackendKind, path: &Path) -> Self {
        match kind {
            BackendKind::Redb => Self::redb(path),
            BackendKind::Memory => Self::in_memory(),
        }
    }

    /// Build the backend for `collection`, creating the collection if it does not exist.
    pub fn build(&self, collection: &str) -> Result<Box<dyn StoreBackend>, StoreError> {
        validate_collection_name(collection)?;
        match self {
            BackendConfig::InMemory => Ok(Box::new(InMemoryBackend::new())),
            BackendConfig::Redb { path } => Ok(Box::new(RedbBackend::open(path, collection)?)),
        }
    }
}

fn validate_collection_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}

/// An in-memory backend using a `RwLock` around two `HashMap`s.
#[derive(Default)]
pub struct InMemoryBackend {
    records: RwLock<HashMap<String, Vec<u8>>>,
    meta: RwLock<HashMap<String, String>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for InMemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self
            .records
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        Ok(guard.get(key).cloned())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        // Both locks are held together so readers never see half a batch.
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        let mut meta = self
            .meta
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        records.extend(batch.records);
        meta.extend(batch.meta);
        Ok(())
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let guard = self
            .records
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        for value in guard.values() {
            visitor(value)?;
        }
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        let guard = self
            .meta
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        Ok(guard.get(key).cloned())
    }
}

/// The Redb backend implementation.
pub mod redb;

pub use self::redb::RedbBackend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_batch_is_visible() {
        let backend = InMemoryBackend::new();
        backend
            .write_batch(WriteBatch {
                records: vec![("a".into(), b"1".to_vec()), ("b".into(), b"2".to_vec())],
                meta: vec![("dimension".into(), "3".into())],
            })
            .unwrap();

        assert_eq!(backend.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.get_meta("dimension").unwrap().as_deref(), Some("3"));

        let mut seen = 0;
        backend
            .scan(&mut |_| {
                seen += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, 2);
    }

    #[test]
    fn collection_names_are_validated() {
        assert!(validate_collection_name("document_store").is_ok());
        assert!(validate_collection_name("docs-2").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("has space").is_err());
        assert!(validate_collection_name(&"x".repeat(64)).is_err());
    }

    #[test]
    fn backend_kind_from_config_string() {
        let kind: BackendKind = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(kind, BackendKind::Memory);
        assert!(matches!(
            BackendConfig::from_kind(kind, Path::new("ignored")),
            BackendConfig::InMemory
        ));
    }
}
