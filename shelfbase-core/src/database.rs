// shelfbase-core/src/database.rs
// Database handle and the scoped connection session

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collection_core::CollectionCore;
use crate::config::{ConnectionConfig, Endpoint};
use crate::error::Result;
use crate::storage::{Backend, FileStorage, MemoryStorage, Storage};

/// A named database over one storage backend
///
/// Generic over Storage backend:
/// - `DatabaseCore<MemoryStorage>` - in-memory
/// - `DatabaseCore<FileStorage>` - JSON file
/// - `DatabaseCore<Backend>` - chosen from a `ConnectionConfig`
pub struct DatabaseCore<S: Storage> {
    name: String,
    storage: Arc<RwLock<S>>,
    /// One handle per collection so every caller shares the same indexes
    collections: RwLock<HashMap<String, CollectionCore<S>>>,
}

impl DatabaseCore<MemoryStorage> {
    pub fn in_memory(name: &str) -> Self {
        Self::with_storage(name, MemoryStorage::new())
    }
}

impl DatabaseCore<FileStorage> {
    /// Open `<dir>/<name>.json`
    pub fn open_dir<P: AsRef<std::path::Path>>(dir: P, name: &str) -> Result<Self> {
        Ok(Self::with_storage(name, FileStorage::open(dir, name)?))
    }
}

impl DatabaseCore<Backend> {
    /// Resolve the endpoint, open the backend and acquire a session on the
    /// configured collection
    pub fn connect(config: &ConnectionConfig) -> Result<Session> {
        config.validate()?;
        let backend = match config.endpoint()? {
            Endpoint::Memory => Backend::Memory(MemoryStorage::new()),
            Endpoint::Directory(dir) => Backend::File(FileStorage::open(dir, &config.database)?),
        };

        let database = DatabaseCore::with_storage(&config.database, backend);
        let collection = database.collection(&config.collection)?;
        let session = Session {
            id: Uuid::new_v4(),
            opened_at: Utc::now(),
            database,
            collection,
            closed: false,
        };
        info!(
            session = %session.id,
            endpoint = %config.redacted_endpoint(),
            namespace = %session.collection.namespace(),
            "session opened"
        );
        Ok(session)
    }

    pub fn backend_kind(&self) -> &'static str {
        self.storage.read().kind()
    }
}

impl<S: Storage> DatabaseCore<S> {
    pub fn with_storage(name: &str, storage: S) -> Self {
        DatabaseCore {
            name: name.to_string(),
            storage: Arc::new(RwLock::new(storage)),
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a collection (creates it if missing)
    ///
    /// A collection re-created after `drop_collection` reuses the cached
    /// handle, so handles taken before the drop keep sharing its indexes.
    pub fn collection(&self, name: &str) -> Result<CollectionCore<S>> {
        {
            let collections = self.collections.read();
            if let Some(existing) = collections.get(name) {
                if self.storage.read().get_collection_meta(name).is_some() {
                    return Ok(existing.clone());
                }
            }
        }

        let mut collections = self.collections.write();
        if let Some(existing) = collections.get(name) {
            let mut storage = self.storage.write();
            if storage.get_collection_meta(name).is_none() {
                storage.create_collection(name)?;
                debug!(database = %self.name, collection = %name, "re-created collection");
            }
            return Ok(existing.clone());
        }
        let collection = CollectionCore::new(name.to_string(), Arc::clone(&self.storage))?
            .in_database(&self.name);
        collections.insert(name.to_string(), collection.clone());
        debug!(database = %self.name, collection = %name, "opened collection");
        Ok(collection)
    }

    pub fn list_collections(&self) -> Vec<String> {
        self.storage.read().list_collections()
    }

    /// Drop the stored documents and every index. Outstanding handles stay
    /// valid and see the empty index set.
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        let collections = self.collections.read();
        let mut storage = self.storage.write();
        storage.drop_collection(name)?;
        if let Some(cached) = collections.get(name) {
            cached.indexes.write().clear();
        }
        debug!(database = %self.name, collection = %name, "dropped collection");
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.storage.write().flush()
    }
}

/// Scoped connection: acquired once per run and released exactly once.
///
/// `close` flushes and reports errors; dropping an unclosed session
/// flushes on a best-effort basis and logs any failure.
pub struct Session {
    id: Uuid,
    opened_at: DateTime<Utc>,
    database: DatabaseCore<Backend>,
    collection: CollectionCore<Backend>,
    closed: bool,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn database(&self) -> &DatabaseCore<Backend> {
        &self.database
    }

    /// The configured collection
    pub fn collection(&self) -> &CollectionCore<Backend> {
        &self.collection
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        let result = self.database.flush();
        info!(session = %self.id, ok = result.is_ok(), "session closed");
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.database.flush() {
            warn!(session = %self.id, error = %e, "flush failed while releasing session");
        }
        debug!(session = %self.id, "session released without close");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShelfError;
    use serde_json::json;
    use tempfile::TempDir;

    fn file_config(dir: &TempDir) -> ConnectionConfig {
        ConnectionConfig {
            endpoint: dir.path().to_string_lossy().to_string(),
            ..ConnectionConfig::default()
        }
    }

    #[test]
    fn test_collection_handles_share_indexes() {
        let db = DatabaseCore::in_memory("plp_bookstore");
        let a = db.collection("books").unwrap();
        a.create_index(crate::index::IndexModel::ascending("title")).unwrap();

        let b = db.collection("books").unwrap();
        assert_eq!(b.list_indexes(), vec!["title_1".to_string()]);
        assert_eq!(b.namespace(), "plp_bookstore.books");
        assert_eq!(db.list_collections(), vec!["books".to_string()]);
    }

    #[test]
    fn test_session_handle_survives_collection_drop() {
        let session = DatabaseCore::connect(&ConnectionConfig::default()).unwrap();
        session
            .collection()
            .create_index(crate::index::IndexModel::ascending("title"))
            .unwrap();
        session.collection().insert_one(json!({"title": "1984"})).unwrap();

        session.database().drop_collection("books").unwrap();
        let fresh = session.database().collection("books").unwrap();
        fresh.insert_one(json!({"title": "Emma"})).unwrap();

        let filter = json!({"title": "Emma"});
        assert_eq!(fresh.find(&filter).unwrap().len(), 1);
        assert_eq!(session.collection().find(&filter).unwrap().len(), 1);
        assert!(session.collection().list_indexes().is_empty());
        assert!(session.collection().find(&json!({"title": "1984"})).unwrap().is_empty());

        // indexes created on either handle stay shared
        fresh.create_index(crate::index::IndexModel::ascending("title")).unwrap();
        session.collection().insert_one(json!({"title": "Beloved"})).unwrap();
        assert_eq!(fresh.find(&json!({"title": "Beloved"})).unwrap().len(), 1);
        let plan = session.collection().explain(&json!({"title": "Beloved"})).unwrap();
        assert_eq!(plan["queryPlanner"]["winningPlan"]["stage"], "IXSCAN");
        session.close().unwrap();
    }

    #[test]
    fn test_drop_unknown_collection_fails() {
        let db = DatabaseCore::in_memory("plp_bookstore");
        assert!(matches!(
            db.drop_collection("books"),
            Err(ShelfError::CollectionNotFound(_))
        ));
    }

    #[test]
    fn test_connect_memory() {
        let session = DatabaseCore::connect(&ConnectionConfig::default()).unwrap();
        assert_eq!(session.database().backend_kind(), "memory");
        assert_eq!(session.collection().namespace(), "plp_bookstore.books");
        session.close().unwrap();
    }

    #[test]
    fn test_connect_missing_directory_fails() {
        let config = ConnectionConfig {
            endpoint: "/definitely/not/a/shelfbase/dir".to_string(),
            ..ConnectionConfig::default()
        };
        assert!(matches!(
            DatabaseCore::connect(&config),
            Err(ShelfError::Connection(_))
        ));
    }

    #[test]
    fn test_session_close_persists() {
        let dir = TempDir::new().unwrap();
        let session = DatabaseCore::connect(&file_config(&dir)).unwrap();
        session.collection().insert_one(json!({"title": "Emma"})).unwrap();
        session.close().unwrap();

        let session = DatabaseCore::connect(&file_config(&dir)).unwrap();
        assert_eq!(session.collection().count_documents(&json!({})).unwrap(), 1);
    }

    #[test]
    fn test_session_drop_releases_and_flushes() {
        let dir = TempDir::new().unwrap();
        {
            let session = DatabaseCore::connect(&file_config(&dir)).unwrap();
            session.collection().insert_one(json!({"title": "Emma"})).unwrap();
        }
        assert!(dir.path().join("plp_bookstore.json").exists());
    }
}
