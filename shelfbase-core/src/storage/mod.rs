// src/storage/mod.rs
//! Storage backends
//!
//! ```text
//! Storage trait
//!   ├── MemoryStorage (ephemeral, `memory:` endpoints and tests)
//!   └── FileStorage   (one JSON database file per database name)
//! ```

mod file_storage;
mod memory_storage;
mod traits;

pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;
pub use traits::Storage;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentId};
use crate::error::{Result, ShelfError};
use crate::find_options::SortDirection;
use crate::index::IndexModel;
use serde_json::Value;

/// Per-collection metadata kept alongside the documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub name: String,
    pub document_count: u64,
    /// Highest integer `_id` handed out or seen
    pub last_id: u64,
    #[serde(default)]
    pub indexes: Vec<IndexDescriptor>,
    pub created_at: DateTime<Utc>,
}

impl CollectionMeta {
    pub fn new(name: &str) -> Self {
        CollectionMeta {
            name: name.to_string(),
            document_count: 0,
            last_id: 0,
            indexes: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Persisted index definition; entries are rebuilt from documents on open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub keys: Vec<(String, i64)>,
    #[serde(default)]
    pub unique: bool,
}

impl From<&IndexModel> for IndexDescriptor {
    fn from(model: &IndexModel) -> Self {
        IndexDescriptor {
            name: model.index_name(),
            keys: model
                .keys
                .iter()
                .map(|(field, dir)| (field.clone(), dir.as_i64()))
                .collect(),
            unique: model.unique,
        }
    }
}

impl IndexDescriptor {
    pub fn to_model(&self) -> Result<IndexModel> {
        let keys = self
            .keys
            .iter()
            .map(|(field, dir)| Ok((field.clone(), SortDirection::from_i64(*dir)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(IndexModel {
            keys,
            unique: self.unique,
            name: Some(self.name.clone()),
        })
    }
}

/// Runtime-selected backend, chosen from the connection endpoint
pub enum Backend {
    Memory(MemoryStorage),
    File(FileStorage),
}

impl Backend {
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Memory(_) => "memory",
            Backend::File(_) => "file",
        }
    }

    fn inner(&self) -> &dyn Storage {
        match self {
            Backend::Memory(s) => s,
            Backend::File(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Storage {
        match self {
            Backend::Memory(s) => s,
            Backend::File(s) => s,
        }
    }
}

impl Storage for Backend {
    fn insert_document(&mut self, collection: &str, doc: Value) -> Result<DocumentId> {
        self.inner_mut().insert_document(collection, doc)
    }

    fn read_document(&self, collection: &str, id: &DocumentId) -> Result<Option<Value>> {
        self.inner().read_document(collection, id)
    }

    fn replace_document(&mut self, collection: &str, id: &DocumentId, doc: Value) -> Result<bool> {
        self.inner_mut().replace_document(collection, id, doc)
    }

    fn delete_document(&mut self, collection: &str, id: &DocumentId) -> Result<bool> {
        self.inner_mut().delete_document(collection, id)
    }

    fn scan_documents(&self, collection: &str) -> Result<Vec<Document>> {
        self.inner().scan_documents(collection)
    }

    fn create_collection(&mut self, name: &str) -> Result<()> {
        self.inner_mut().create_collection(name)
    }

    fn drop_collection(&mut self, name: &str) -> Result<()> {
        self.inner_mut().drop_collection(name)
    }

    fn list_collections(&self) -> Vec<String> {
        self.inner().list_collections()
    }

    fn get_collection_meta(&self, name: &str) -> Option<&CollectionMeta> {
        self.inner().get_collection_meta(name)
    }

    fn get_collection_meta_mut(&mut self, name: &str) -> Option<&mut CollectionMeta> {
        self.inner_mut().get_collection_meta_mut(name)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner_mut().flush()
    }
}

/// Object body with `_id` resolved: the caller's `_id`, or the next
/// auto-increment integer from `meta`
pub(crate) fn assign_id(meta: &mut CollectionMeta, doc: Value) -> Result<(DocumentId, Value)> {
    let Value::Object(mut fields) = doc else {
        return Err(ShelfError::Serialization(
            "Document must be an object".to_string(),
        ));
    };

    let id = match fields.get("_id") {
        Some(id_value) => DocumentId::from_value(id_value)?,
        None => {
            let id = DocumentId::new_auto(meta.last_id);
            fields.insert("_id".to_string(), id.to_value());
            id
        }
    };

    if let DocumentId::Int(n) = id {
        if n > 0 && n as u64 > meta.last_id {
            meta.last_id = n as u64;
        }
    }

    Ok((id, Value::Object(fields)))
}
