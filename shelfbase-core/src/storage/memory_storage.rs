// storage/memory_storage.rs
//! Pure in-memory storage implementation
//!
//! Backs `memory:` endpoints and most tests. Data is lost when dropped.

use crate::document::{Document, DocumentId};
use crate::error::{Result, ShelfError};
use crate::storage::{assign_id, CollectionMeta, Storage};
use serde_json::Value;
use std::collections::HashMap;

/// In-memory storage backend
///
/// ```
/// use serde_json::json;
/// use shelfbase_core::storage::{MemoryStorage, Storage};
///
/// let mut storage = MemoryStorage::new();
/// storage.create_collection("books").unwrap();
/// let id = storage.insert_document("books", json!({"title": "Emma"})).unwrap();
/// assert_eq!(id.to_string(), "1");
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    /// Collection name -> documents in natural order
    collections: HashMap<String, Vec<Document>>,

    /// Collection name -> metadata
    metadata: HashMap<String, CollectionMeta>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from previously persisted collections
    pub(crate) fn from_parts(parts: Vec<(CollectionMeta, Vec<Document>)>) -> Self {
        let mut storage = MemoryStorage::new();
        for (meta, docs) in parts {
            storage.collections.insert(meta.name.clone(), docs);
            storage.metadata.insert(meta.name.clone(), meta);
        }
        storage
    }

    /// Collections with their documents, ordered by name
    pub(crate) fn parts(&self) -> Vec<(&CollectionMeta, &[Document])> {
        let mut names: Vec<&String> = self.metadata.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| {
                let meta = self.metadata.get(name)?;
                let docs = self.collections.get(name)?;
                Some((meta, docs.as_slice()))
            })
            .collect()
    }

    fn docs_mut(&mut self, collection: &str) -> Result<&mut Vec<Document>> {
        self.collections
            .get_mut(collection)
            .ok_or_else(|| ShelfError::CollectionNotFound(collection.to_string()))
    }

    fn meta_mut(&mut self, collection: &str) -> Result<&mut CollectionMeta> {
        self.metadata
            .get_mut(collection)
            .ok_or_else(|| ShelfError::CollectionNotFound(collection.to_string()))
    }
}

impl Storage for MemoryStorage {
    // ========================================================================
    // DOCUMENT OPERATIONS
    // ========================================================================

    fn insert_document(&mut self, collection: &str, doc: Value) -> Result<DocumentId> {
        let mut meta = self.meta_mut(collection)?.clone();
        let (id, body) = assign_id(&mut meta, doc)?;

        let docs = self.docs_mut(collection)?;
        if docs.iter().any(|d| d.id == id) {
            return Err(ShelfError::WriteRejected(format!(
                "duplicate key: _id {} already exists in '{}'",
                id, collection
            )));
        }
        docs.push(Document::from_value(body)?);

        meta.document_count += 1;
        *self.meta_mut(collection)? = meta;
        Ok(id)
    }

    fn read_document(&self, collection: &str, id: &DocumentId) -> Result<Option<Value>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| &d.id == id))
            .map(|d| d.as_value().clone()))
    }

    fn replace_document(&mut self, collection: &str, id: &DocumentId, doc: Value) -> Result<bool> {
        let replacement = Document::from_value(doc)?;
        if &replacement.id != id {
            return Err(ShelfError::WriteRejected(
                "the _id field is immutable".to_string(),
            ));
        }
        let docs = self.docs_mut(collection)?;
        match docs.iter_mut().find(|d| &d.id == id) {
            Some(slot) => {
                *slot = replacement;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_document(&mut self, collection: &str, id: &DocumentId) -> Result<bool> {
        let docs = self.docs_mut(collection)?;
        let Some(pos) = docs.iter().position(|d| &d.id == id) else {
            return Ok(false);
        };
        docs.remove(pos);

        let meta = self.meta_mut(collection)?;
        meta.document_count = meta.document_count.saturating_sub(1);
        Ok(true)
    }

    fn scan_documents(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self.collections.get(collection).cloned().unwrap_or_default())
    }

    // ========================================================================
    // COLLECTION MANAGEMENT
    // ========================================================================

    fn create_collection(&mut self, name: &str) -> Result<()> {
        if self.collections.contains_key(name) {
            return Err(ShelfError::WriteRejected(format!(
                "collection '{}' already exists",
                name
            )));
        }
        self.collections.insert(name.to_string(), Vec::new());
        self.metadata
            .insert(name.to_string(), CollectionMeta::new(name));
        Ok(())
    }

    fn drop_collection(&mut self, name: &str) -> Result<()> {
        if self.collections.remove(name).is_none() {
            return Err(ShelfError::CollectionNotFound(name.to_string()));
        }
        self.metadata.remove(name);
        Ok(())
    }

    fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.keys().cloned().collect();
        names.sort();
        names
    }

    // ========================================================================
    // METADATA ACCESS
    // ========================================================================

    fn get_collection_meta(&self, name: &str) -> Option<&CollectionMeta> {
        self.metadata.get(name)
    }

    fn get_collection_meta_mut(&mut self, name: &str) -> Option<&mut CollectionMeta> {
        self.metadata.get_mut(name)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
