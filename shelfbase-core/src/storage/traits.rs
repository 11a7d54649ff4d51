// src/storage/traits.rs
//! Storage abstraction shared by every backend

use crate::document::{Document, DocumentId};
use crate::error::Result;
use crate::storage::CollectionMeta;
use serde_json::Value;

/// Core storage abstraction
///
/// Documents are kept in natural (insertion) order. Replacing a document
/// keeps its position; deleting it closes the gap.
pub trait Storage: Send + Sync {
    // ========================================================================
    // DOCUMENT OPERATIONS
    // ========================================================================

    /// Append a document, assigning an auto-increment `_id` when absent.
    /// A duplicate `_id` is rejected.
    fn insert_document(&mut self, collection: &str, doc: Value) -> Result<DocumentId>;

    fn read_document(&self, collection: &str, id: &DocumentId) -> Result<Option<Value>>;

    /// Replace in place; returns false when no document has this id
    fn replace_document(&mut self, collection: &str, id: &DocumentId, doc: Value) -> Result<bool>;

    /// Returns false when no document has this id
    fn delete_document(&mut self, collection: &str, id: &DocumentId) -> Result<bool>;

    /// All documents in natural order
    fn scan_documents(&self, collection: &str) -> Result<Vec<Document>>;

    // ========================================================================
    // COLLECTION MANAGEMENT
    // ========================================================================

    fn create_collection(&mut self, name: &str) -> Result<()>;

    fn drop_collection(&mut self, name: &str) -> Result<()>;

    fn list_collections(&self) -> Vec<String>;

    // ========================================================================
    // METADATA ACCESS
    // ========================================================================

    fn get_collection_meta(&self, name: &str) -> Option<&CollectionMeta>;

    fn get_collection_meta_mut(&mut self, name: &str) -> Option<&mut CollectionMeta>;

    // ========================================================================
    // PERSISTENCE & FLUSHING
    // ========================================================================

    /// Flush pending writes. No-op for memory storage.
    fn flush(&mut self) -> Result<()>;
}
