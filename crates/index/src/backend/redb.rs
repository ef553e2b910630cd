//! Redb (Rust embedded database) backend for document collections.
//!
//! Each collection owns two tables in the database file: `docs::<name>` holds the encoded
//! records keyed by document id, `meta::<name>` holds collection-level settings such as the
//! embedding dimension fixed by the first write. Several collections can share one file.
//!
//! Redb commits are durable once `commit` returns, so [`flush`](StoreBackend::flush) is a no-op.

use crate::backend::{StoreBackend, WriteBatch};
use crate::StoreError;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

/// Redb backend implementation for persistent key-value storage.
///
/// The `Arc<Database>` wrapper allows safe sharing across threads; redb handles its own
/// locking and MVCC.
pub struct RedbBackend {
    db: Arc<Database>,
    records_table: String,
    meta_table: String,
}

impl RedbBackend {
    /// Open or create the database at `path` and make sure the collection's tables exist.
    ///
    /// # Example
    /// ```no_run
    /// use index::RedbBackend;
    ///
    /// let backend = RedbBackend::open("/tmp/docvault.redb", "document_store").unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P, collection: &str) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(StoreError::backend)?;
            }
        }

        let db = Database::create(path).map_err(StoreError::backend)?;
        let backend = Self {
            db: Arc::new(db),
            records_table: format!("docs::{collection}"),
            meta_table: format!("meta::{collection}"),
        };

        // Opening a table inside a write transaction creates it when absent.
        let write_txn = backend.db.begin_write().map_err(StoreError::backend)?;
        {
            write_txn
                .open_table(backend.records())
                .map_err(StoreError::backend)?;
            write_txn
                .open_table(backend.meta())
                .map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;

        tracing::debug!(path = %path.display(), collection, "redb collection ready");
        Ok(backend)
    }

    fn records(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.records_table)
    }

    fn meta(&self) -> TableDefinition<'_, &'static str, &'static str> {
        TableDefinition::new(&self.meta_table)
    }
}

impl StoreBackend for RedbBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(self.records())
            .map_err(StoreError::backend)?;

        let value = table.get(key).map_err(StoreError::backend)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut records = write_txn
                .open_table(self.records())
                .map_err(StoreError::backend)?;
            for (key, value) in &batch.records {
                records
                    .insert(key.as_str(), value.as_slice())
                    .map_err(StoreError::backend)?;
            }

            let mut meta = write_txn
                .open_table(self.meta())
                .map_err(StoreError::backend)?;
            for (key, value) in &batch.meta {
                meta.insert(key.as_str(), value.as_str())
                    .map_err(StoreError::backend)?;
            }
        }
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(self.records())
            .map_err(StoreError::backend)?;

        for item in table.iter().map_err(StoreError::backend)? {
            let (_, value) = item.map_err(StoreError::backend)?;
            visitor(value.value())?;
        }

        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn.open_table(self.meta()).map_err(StoreError::backend)?;
        let value = table.get(key).map_err(StoreError::backend)?;
        Ok(value.map(|v| v.value().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn batch(records: &[(&str, &[u8])]) -> WriteBatch {
        WriteBatch {
            records: records
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
            meta: Vec::new(),
        }
    }

    #[test]
    fn redb_backend_roundtrip() {
        let dir = tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("store.redb"), "docs").unwrap();

        backend.write_batch(batch(&[("key1", b"value1")])).unwrap();
        assert_eq!(backend.get("key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(backend.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn redb_backend_scan_and_meta() {
        let dir = tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("store.redb"), "docs").unwrap();

        let mut write = batch(&[("key1", b"value1"), ("key2", b"value2")]);
        write.meta.push(("dimension".into(), "384".into()));
        backend.write_batch(write).unwrap();

        let mut collected = Vec::new();
        backend
            .scan(&mut |value| {
                collected.push(value.to_vec());
                Ok(())
            })
            .unwrap();
        assert_eq!(collected.len(), 2);
        assert!(collected.contains(&b"value1".to_vec()));
        assert_eq!(backend.get_meta("dimension").unwrap().as_deref(), Some("384"));
    }

    #[test]
    fn redb_backend_creates_parent_dirs_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.redb");
        {
            let backend = RedbBackend::open(&path, "docs").unwrap();
            backend.write_batch(batch(&[("key1", b"value1")])).unwrap();
        }

        let reopened = RedbBackend::open(&path, "docs").unwrap();
        assert_eq!(reopened.get("key1").unwrap(), Some(b"value1".to_vec()));
    }

    #[test]
    fn collections_in_one_file_are_isolated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.redb");
        let backend = RedbBackend::open(&path, "first").unwrap();
        backend.write_batch(batch(&[("key1", b"value1")])).unwrap();
        drop(backend);

        let other = RedbBackend::open(&path, "second").unwrap();
        assert_eq!(other.get("key1").unwrap(), None);
    }
}
