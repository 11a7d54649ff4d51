// storage/file_storage.rs
//! File-based storage: one JSON database file per database name
//!
//! ```text
//! FileStorage (Storage trait implementation)
//!      ↓
//! MemoryStorage (working set)
//!      ↓
//! <dir>/<database>.json (rewritten atomically on flush)
//! ```

use crate::document::{Document, DocumentId};
use crate::error::{Result, ShelfError};
use crate::storage::{CollectionMeta, MemoryStorage, Storage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct DatabaseFile {
    format_version: u32,
    database: String,
    saved_at: DateTime<Utc>,
    collections: Vec<CollectionFile>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    meta: CollectionMeta,
    documents: Vec<Value>,
}

/// File-backed storage
///
/// All reads are served from memory; `flush` rewrites the file through a
/// temporary sibling and a rename, so a crash never leaves a torn file.
#[derive(Debug)]
pub struct FileStorage {
    inner: MemoryStorage,
    path: PathBuf,
    dirty: bool,
}

impl FileStorage {
    /// Open `<dir>/<database>.json`, creating it on first flush.
    /// The directory itself must already exist.
    pub fn open<P: AsRef<Path>>(dir: P, database: &str) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ShelfError::Connection(format!(
                "endpoint directory '{}' does not exist",
                dir.display()
            )));
        }

        let path = dir.join(format!("{}.json", database));
        let inner = if path.exists() {
            let bytes = fs::read(&path)?;
            let file: DatabaseFile = serde_json::from_slice(&bytes).map_err(|e| {
                ShelfError::Connection(format!("cannot read '{}': {}", path.display(), e))
            })?;
            if file.format_version != FORMAT_VERSION {
                return Err(ShelfError::Connection(format!(
                    "'{}' has unsupported format version {}",
                    path.display(),
                    file.format_version
                )));
            }

            let mut parts = Vec::with_capacity(file.collections.len());
            for collection in file.collections {
                let docs = collection
                    .documents
                    .into_iter()
                    .map(Document::from_value)
                    .collect::<Result<Vec<_>>>()?;
                parts.push((collection.meta, docs));
            }
            debug!(path = %path.display(), collections = parts.len(), "loaded database file");
            MemoryStorage::from_parts(parts)
        } else {
            debug!(path = %path.display(), "new database file");
            MemoryStorage::new()
        };

        Ok(FileStorage {
            inner,
            path,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mark_dirty<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_ok() {
            self.dirty = true;
        }
        result
    }

    fn write_file(&self) -> Result<()> {
        let file = DatabaseFile {
            format_version: FORMAT_VERSION,
            database: self
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
            saved_at: Utc::now(),
            collections: self
                .inner
                .parts()
                .into_iter()
                .map(|(meta, docs)| CollectionFile {
                    meta: meta.clone(),
                    documents: docs.iter().map(|d| d.as_value().clone()).collect(),
                })
                .collect(),
        };

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_vec_pretty(&file)?)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn insert_document(&mut self, collection: &str, doc: Value) -> Result<DocumentId> {
        let result = self.inner.insert_document(collection, doc);
        self.mark_dirty(result)
    }

    fn read_document(&self, collection: &str, id: &DocumentId) -> Result<Option<Value>> {
        self.inner.read_document(collection, id)
    }

    fn replace_document(&mut self, collection: &str, id: &DocumentId, doc: Value) -> Result<bool> {
        let result = self.inner.replace_document(collection, id, doc);
        self.mark_dirty(result)
    }

    fn delete_document(&mut self, collection: &str, id: &DocumentId) -> Result<bool> {
        let result = self.inner.delete_document(collection, id);
        self.mark_dirty(result)
    }

    fn scan_documents(&self, collection: &str) -> Result<Vec<Document>> {
        self.inner.scan_documents(collection)
    }

    fn create_collection(&mut self, name: &str) -> Result<()> {
        let result = self.inner.create_collection(name);
        self.mark_dirty(result)
    }

    fn drop_collection(&mut self, name: &str) -> Result<()> {
        let result = self.inner.drop_collection(name);
        self.mark_dirty(result)
    }

    fn list_collections(&self) -> Vec<String> {
        self.inner.list_collections()
    }

    fn get_collection_meta(&self, name: &str) -> Option<&CollectionMeta> {
        self.inner.get_collection_meta(name)
    }

    fn get_collection_meta_mut(&mut self, name: &str) -> Option<&mut CollectionMeta> {
        // Callers only take this to change metadata
        self.dirty = true;
        self.inner.get_collection_meta_mut(name)
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.write_file()?;
        self.dirty = false;
        debug!(path = %self.path.display(), "flushed database file");
        Ok(())
    }
}

impl Drop for FileStorage {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to flush on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_directory_is_connection_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            FileStorage::open(&missing, "plp_bookstore"),
            Err(ShelfError::Connection(_))
        ));
    }

    #[test]
    fn test_persist_and_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut storage = FileStorage::open(dir.path(), "plp_bookstore").unwrap();
            storage.create_collection("books").unwrap();
            storage.insert_document("books", json!({"title": "B"})).unwrap();
            storage.insert_document("books", json!({"title": "A"})).unwrap();
            storage.flush().unwrap();
        }
        assert!(dir.path().join("plp_bookstore.json").exists());

        let storage = FileStorage::open(dir.path(), "plp_bookstore").unwrap();
        let docs = storage.scan_documents("books").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].get("title"), Some(&json!("B")));
        assert_eq!(storage.get_collection_meta("books").unwrap().last_id, 2);
    }

    #[test]
    fn test_drop_flushes_pending_writes() {
        let dir = TempDir::new().unwrap();
        {
            let mut storage = FileStorage::open(dir.path(), "db").unwrap();
            storage.create_collection("books").unwrap();
            storage.insert_document("books", json!({"title": "A"})).unwrap();
        }
        let storage = FileStorage::open(dir.path(), "db").unwrap();
        assert_eq!(storage.scan_documents("books").unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_connection_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("db.json"), b"not json").unwrap();
        assert!(matches!(
            FileStorage::open(dir.path(), "db"),
            Err(ShelfError::Connection(_))
        ));
    }
}
