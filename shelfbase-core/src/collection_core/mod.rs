// shelfbase-core/src/collection_core/mod.rs
// Collection logic over any Storage backend
//
// ├── Constructor (index rebuild from persisted definitions)
// ├── Writes: insert_one, insert_many, update_one, delete_one, delete_many
// ├── Reads: find, find_with_options, find_one, count_documents, aggregate
// ├── Indexes: create_index, drop_index, list_indexes
// ├── explain
// └── Private helpers: plan + scan + filter

mod update;

pub use update::{apply_update, validate_update};

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::aggregation::Pipeline;
use crate::document::{Document, DocumentId};
use crate::error::{Result, ShelfError};
use crate::find_options::{apply_limit_skip, apply_projection, apply_sort, FindOptions};
use crate::index::{IndexManager, IndexModel};
use crate::query::Query;
use crate::query_planner::{QueryPlan, QueryPlanner};
use crate::storage::{IndexDescriptor, Storage};

/// Result of insert_many operation
#[derive(Debug, Clone)]
pub struct InsertManyResult {
    pub inserted_ids: Vec<DocumentId>,
    pub inserted_count: usize,
}

/// Matched documents plus the work done to find them
struct QueryExecution {
    plan: QueryPlan,
    docs: Vec<Document>,
    docs_examined: usize,
    keys_examined: usize,
}

/// A collection handle
///
/// Generic over Storage backend:
/// - `CollectionCore<MemoryStorage>` - in-memory
/// - `CollectionCore<FileStorage>` - JSON file
/// - `CollectionCore<Backend>` - chosen at connect time
///
/// Cloning is cheap and clones share storage and indexes.
pub struct CollectionCore<S: Storage> {
    pub name: String,
    namespace: String,
    pub storage: Arc<RwLock<S>>,
    /// Secondary indexes, rebuilt from persisted definitions on open
    pub indexes: Arc<RwLock<IndexManager>>,
}

impl<S: Storage> Clone for CollectionCore<S> {
    fn clone(&self) -> Self {
        CollectionCore {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            storage: Arc::clone(&self.storage),
            indexes: Arc::clone(&self.indexes),
        }
    }
}

impl<S: Storage> CollectionCore<S> {
    // ========== CONSTRUCTOR ==========

    /// Open a collection, creating it when missing
    pub fn new(name: String, storage: Arc<RwLock<S>>) -> Result<Self> {
        if name.is_empty() {
            return Err(ShelfError::InvalidQuery(
                "Collection name cannot be empty".to_string(),
            ));
        }

        let mut index_manager = IndexManager::new();
        {
            let mut storage_guard = storage.write();
            if storage_guard.get_collection_meta(&name).is_none() {
                storage_guard.create_collection(&name)?;
            }

            let persisted = storage_guard
                .get_collection_meta(&name)
                .map(|meta| meta.indexes.clone())
                .unwrap_or_default();

            if !persisted.is_empty() {
                let docs = storage_guard.scan_documents(&name)?;
                for descriptor in &persisted {
                    index_manager.create_index(
                        descriptor.to_model()?,
                        docs.iter().map(|d| (&d.id, d.as_value())),
                    )?;
                }
                debug!(
                    collection = %name,
                    indexes = persisted.len(),
                    documents = docs.len(),
                    "rebuilt persisted indexes"
                );
            }
        }

        Ok(CollectionCore {
            namespace: name.clone(),
            name,
            storage,
            indexes: Arc::new(RwLock::new(index_manager)),
        })
    }

    /// Same collection, reported under `<database>.<collection>`
    pub fn in_database(mut self, database: &str) -> Self {
        self.namespace = format!("{}.{}", database, self.name);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    // ========== WRITES ==========

    /// Insert one document; `_id` is assigned when absent
    pub fn insert_one(&self, doc: Value) -> Result<DocumentId> {
        let mut storage = self.storage.write();
        let mut indexes = self.indexes.write();

        let id = storage.insert_document(&self.name, doc)?;
        let body = storage
            .read_document(&self.name, &id)?
            .ok_or_else(|| ShelfError::WriteRejected(format!("document {} vanished", id)))?;

        if let Err(e) = indexes.on_insert(&id, &body) {
            storage.delete_document(&self.name, &id)?;
            return Err(e);
        }

        debug!(collection = %self.name, id = %id, "inserted document");
        Ok(id)
    }

    /// Ordered insert: stops at the first failure
    pub fn insert_many(&self, docs: Vec<Value>) -> Result<InsertManyResult> {
        let mut inserted_ids = Vec::with_capacity(docs.len());
        for doc in docs {
            inserted_ids.push(self.insert_one(doc)?);
        }
        Ok(InsertManyResult {
            inserted_count: inserted_ids.len(),
            inserted_ids,
        })
    }

    /// Update the first matching document (natural order).
    /// Returns (matched_count, modified_count).
    pub fn update_one(&self, query_json: &Value, update_json: &Value) -> Result<(u64, u64)> {
        validate_update(update_json)?;
        let query = Query::from_json(query_json)?;

        let mut storage = self.storage.write();
        let mut indexes = self.indexes.write();

        let execution = Self::execute(&*storage, &indexes, &self.name, &query, true)?;
        let Some(original) = execution.docs.into_iter().next() else {
            debug!(collection = %self.name, "update_one matched nothing");
            return Ok((0, 0));
        };

        let mut updated = original.clone();
        if !apply_update(&mut updated, update_json)? {
            return Ok((1, 0));
        }

        indexes.on_update(&original.id, original.as_value(), updated.as_value())?;
        if let Err(e) =
            storage.replace_document(&self.name, &original.id, updated.as_value().clone())
        {
            indexes.on_update(&original.id, updated.as_value(), original.as_value())?;
            return Err(e);
        }

        debug!(collection = %self.name, id = %original.id, "updated document");
        Ok((1, 1))
    }

    /// Delete the first matching document (natural order)
    pub fn delete_one(&self, query_json: &Value) -> Result<u64> {
        self.delete_matching(query_json, true)
    }

    pub fn delete_many(&self, query_json: &Value) -> Result<u64> {
        self.delete_matching(query_json, false)
    }

    fn delete_matching(&self, query_json: &Value, first_only: bool) -> Result<u64> {
        let query = Query::from_json(query_json)?;

        let mut storage = self.storage.write();
        let mut indexes = self.indexes.write();

        let execution = Self::execute(&*storage, &indexes, &self.name, &query, first_only)?;
        let mut deleted = 0;
        for doc in execution.docs {
            if storage.delete_document(&self.name, &doc.id)? {
                indexes.on_remove(&doc.id, doc.as_value());
                deleted += 1;
            }
        }

        debug!(collection = %self.name, deleted, "deleted documents");
        Ok(deleted)
    }

    // ========== READS ==========

    pub fn find(&self, query_json: &Value) -> Result<Vec<Value>> {
        self.find_with_options(query_json, &FindOptions::default())
    }

    /// Filter, then sort, then skip/limit, then project
    pub fn find_with_options(
        &self,
        query_json: &Value,
        options: &FindOptions,
    ) -> Result<Vec<Value>> {
        options.validate()?;
        let query = Query::from_json(query_json)?;

        let execution = {
            let storage = self.storage.read();
            let indexes = self.indexes.read();
            Self::execute(&*storage, &indexes, &self.name, &query, false)?
        };
        debug!(
            collection = %self.name,
            stage = execution.plan.stage(),
            matched = execution.docs.len(),
            "find"
        );

        let mut docs: Vec<Value> = execution.docs.into_iter().map(Document::into_value).collect();
        if let Some(ref sort) = options.sort {
            apply_sort(&mut docs, sort);
        }
        let docs = apply_limit_skip(docs, options.limit, options.skip);

        Ok(match options.projection {
            Some(ref projection) => docs.iter().map(|d| apply_projection(d, projection)).collect(),
            None => docs,
        })
    }

    pub fn find_one(&self, query_json: &Value) -> Result<Option<Value>> {
        let mut docs = self.find_with_options(query_json, &FindOptions::new().with_limit(1))?;
        Ok(docs.pop())
    }

    pub fn count_documents(&self, query_json: &Value) -> Result<u64> {
        let query = Query::from_json(query_json)?;
        let storage = self.storage.read();
        let indexes = self.indexes.read();
        Ok(Self::execute(&*storage, &indexes, &self.name, &query, false)?.docs.len() as u64)
    }

    /// Run an aggregation pipeline. A leading `$match` may use an index.
    pub fn aggregate(&self, pipeline_json: &Value) -> Result<Vec<Value>> {
        let pipeline = Pipeline::from_json(pipeline_json)?;

        let docs: Vec<Value> = {
            let storage = self.storage.read();
            let indexes = self.indexes.read();
            match pipeline.leading_match() {
                Some(query) => Self::execute(&*storage, &indexes, &self.name, query, false)?
                    .docs
                    .into_iter()
                    .map(Document::into_value)
                    .collect(),
                None => storage
                    .scan_documents(&self.name)?
                    .into_iter()
                    .map(Document::into_value)
                    .collect(),
            }
        };

        let results = pipeline.execute(docs)?;
        debug!(
            collection = %self.name,
            stages = pipeline.len(),
            results = results.len(),
            "aggregate"
        );
        Ok(results)
    }

    // ========== INDEXES ==========

    /// Create an index and persist its definition. Returns the index name.
    pub fn create_index(&self, model: IndexModel) -> Result<String> {
        let mut storage = self.storage.write();
        let mut indexes = self.indexes.write();

        let docs = storage.scan_documents(&self.name)?;
        let name = indexes.create_index(model.clone(), docs.iter().map(|d| (&d.id, d.as_value())))?;

        let meta = storage
            .get_collection_meta_mut(&self.name)
            .ok_or_else(|| ShelfError::CollectionNotFound(self.name.clone()))?;
        if !meta.indexes.iter().any(|d| d.name == name) {
            meta.indexes.push(IndexDescriptor::from(&model));
            info!(collection = %self.name, index = %name, "created index");
        }
        Ok(name)
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        let mut storage = self.storage.write();
        let mut indexes = self.indexes.write();

        indexes.drop_index(name)?;
        if let Some(meta) = storage.get_collection_meta_mut(&self.name) {
            meta.indexes.retain(|d| d.name != name);
        }
        Ok(())
    }

    /// Index names in creation order
    pub fn list_indexes(&self) -> Vec<String> {
        self.indexes.read().list_indexes()
    }

    // ========== EXPLAIN ==========

    /// Run the query and describe how it was answered
    pub fn explain(&self, query_json: &Value) -> Result<Value> {
        let query = Query::from_json(query_json)?;
        let started = Instant::now();
        let execution = {
            let storage = self.storage.read();
            let indexes = self.indexes.read();
            Self::execute(&*storage, &indexes, &self.name, &query, false)?
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        Ok(json!({
            "queryPlanner": {
                "namespace": self.namespace,
                "parsedQuery": query.to_json(),
                "winningPlan": execution.plan.to_json(),
            },
            "executionStats": {
                "nReturned": execution.docs.len(),
                "totalDocsExamined": execution.docs_examined,
                "totalKeysExamined": execution.keys_examined,
                "executionTimeMillis": elapsed_ms,
                "indexUsed": execution.plan.index_name().is_some(),
            }
        }))
    }

    // ========== PRIVATE HELPERS ==========

    /// Plan, gather candidates and re-apply the full filter.
    /// Matches come back in natural order whichever plan won.
    fn execute(
        storage: &S,
        indexes: &IndexManager,
        collection: &str,
        query: &Query,
        first_only: bool,
    ) -> Result<QueryExecution> {
        let plan = QueryPlanner::plan(query.to_json(), indexes.indexes());
        let all_docs = storage.scan_documents(collection)?;

        let (candidates, keys_examined): (Vec<Document>, usize) = match plan {
            QueryPlan::CollectionScan => (all_docs, 0),
            QueryPlan::IndexScan {
                ref index_name,
                ref bounds,
                ..
            } => match indexes.get_index(index_name) {
                Some(index) => {
                    let scan = index.scan(bounds);
                    let candidates = all_docs
                        .into_iter()
                        .filter(|d| scan.ids.contains(&d.id))
                        .collect();
                    (candidates, scan.keys_examined)
                }
                None => (all_docs, 0),
            },
        };

        let mut docs = Vec::new();
        let mut docs_examined = 0;
        for doc in candidates {
            docs_examined += 1;
            if query.matches(&doc)? {
                docs.push(doc);
                if first_only {
                    break;
                }
            }
        }

        Ok(QueryExecution {
            plan,
            docs,
            docs_examined,
            keys_examined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn create_collection() -> CollectionCore<MemoryStorage> {
        let storage = Arc::new(RwLock::new(MemoryStorage::new()));
        let collection = CollectionCore::new("books".to_string(), storage).unwrap();
        collection
            .insert_many(vec![
                json!({"title": "1984", "author": "George Orwell", "price": 10.0}),
                json!({"title": "Emma", "author": "Jane Austen", "price": 7.5}),
                json!({"title": "Animal Farm", "author": "George Orwell", "price": 8.0}),
            ])
            .unwrap();
        collection
    }

    #[test]
    fn test_find_natural_order() {
        let collection = create_collection();
        let docs = collection.find(&json!({"author": "George Orwell"})).unwrap();
        let titles: Vec<_> = docs.iter().map(|d| d["title"].clone()).collect();
        assert_eq!(titles, vec![json!("1984"), json!("Animal Farm")]);
    }

    #[test]
    fn test_find_invalid_filter_on_empty_collection() {
        let storage = Arc::new(RwLock::new(MemoryStorage::new()));
        let collection = CollectionCore::new("empty".to_string(), storage).unwrap();
        let result = collection.find(&json!({"price": {"$gt": [1]}}));
        assert!(matches!(result, Err(ShelfError::InvalidQuery(_))));
    }

    #[test]
    fn test_update_one_counts() {
        let collection = create_collection();
        let update = json!({"$set": {"price": 12.99}});

        assert_eq!(collection.update_one(&json!({"title": "1984"}), &update).unwrap(), (1, 1));
        assert_eq!(collection.update_one(&json!({"title": "1984"}), &update).unwrap(), (1, 0));
        assert_eq!(collection.update_one(&json!({"title": "Dune"}), &update).unwrap(), (0, 0));

        let doc = collection.find_one(&json!({"title": "1984"})).unwrap().unwrap();
        assert_eq!(doc["price"], json!(12.99));
    }

    #[test]
    fn test_update_one_rejects_bad_update() {
        let collection = create_collection();
        let result = collection.update_one(&json!({"title": "1984"}), &json!({"price": 1}));
        assert!(matches!(result, Err(ShelfError::WriteRejected(_))));
    }

    #[test]
    fn test_delete_one_then_zero() {
        let collection = create_collection();
        assert_eq!(collection.delete_one(&json!({"title": "Emma"})).unwrap(), 1);
        assert_eq!(collection.delete_one(&json!({"title": "Emma"})).unwrap(), 0);
        assert_eq!(collection.count_documents(&json!({})).unwrap(), 2);
    }

    #[test]
    fn test_delete_one_removes_only_first_match() {
        let collection = create_collection();
        assert_eq!(collection.delete_one(&json!({"author": "George Orwell"})).unwrap(), 1);
        let remaining = collection.find(&json!({"author": "George Orwell"})).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0]["title"], "Animal Farm");
    }

    #[test]
    fn test_explain_collscan_then_ixscan() {
        let collection = create_collection().in_database("plp_bookstore");
        let before = collection.explain(&json!({"title": "1984"})).unwrap();
        assert_eq!(before["queryPlanner"]["namespace"], "plp_bookstore.books");
        assert_eq!(before["queryPlanner"]["winningPlan"]["stage"], "COLLSCAN");
        assert_eq!(before["executionStats"]["totalDocsExamined"], 3);
        assert_eq!(before["executionStats"]["indexUsed"], false);

        assert_eq!(collection.create_index(IndexModel::ascending("title")).unwrap(), "title_1");

        let after = collection.explain(&json!({"title": "1984"})).unwrap();
        assert_eq!(after["queryPlanner"]["winningPlan"]["stage"], "IXSCAN");
        assert_eq!(after["queryPlanner"]["winningPlan"]["indexName"], "title_1");
        assert_eq!(after["executionStats"]["nReturned"], 1);
        assert_eq!(after["executionStats"]["totalDocsExamined"], 1);
        assert_eq!(after["executionStats"]["totalKeysExamined"], 1);
        assert_eq!(after["executionStats"]["indexUsed"], true);
    }

    #[test]
    fn test_index_maintained_across_writes() {
        let collection = create_collection();
        collection.create_index(IndexModel::ascending("title")).unwrap();

        collection
            .update_one(&json!({"title": "Emma"}), &json!({"$set": {"title": "Persuasion"}}))
            .unwrap();
        assert!(collection.find(&json!({"title": "Emma"})).unwrap().is_empty());
        assert_eq!(collection.find(&json!({"title": "Persuasion"})).unwrap().len(), 1);

        collection.delete_one(&json!({"title": "Persuasion"})).unwrap();
        assert!(collection.find(&json!({"title": "Persuasion"})).unwrap().is_empty());
    }

    #[test]
    fn test_unique_index_blocks_duplicate_insert() {
        let collection = create_collection();
        collection
            .create_index(IndexModel::ascending("title").with_unique(true))
            .unwrap();

        let result = collection.insert_one(json!({"title": "Emma"}));
        assert!(matches!(result, Err(ShelfError::IndexError(_))));
        assert_eq!(collection.count_documents(&json!({})).unwrap(), 3);
    }

    #[test]
    fn test_indexes_rebuilt_on_reopen() {
        let collection = create_collection();
        collection.create_index(IndexModel::ascending("author")).unwrap();

        let reopened = CollectionCore::new("books".to_string(), Arc::clone(&collection.storage)).unwrap();
        assert_eq!(reopened.list_indexes(), vec!["author_1".to_string()]);
        let plan = reopened.explain(&json!({"author": "Jane Austen"})).unwrap();
        assert_eq!(plan["queryPlanner"]["winningPlan"]["stage"], "IXSCAN");
    }

    #[test]
    fn test_aggregate_with_leading_match() {
        let collection = create_collection();
        let results = collection
            .aggregate(&json!([
                {"$match": {"author": "George Orwell"}},
                {"$group": {"_id": "$author", "total": {"$sum": "$price"}}}
            ]))
            .unwrap();
        assert_eq!(results, vec![json!({"_id": "George Orwell", "total": 18})]);
    }

    #[test]
    fn test_find_with_options_pipeline_order() {
        let collection = create_collection();
        let options = FindOptions::new()
            .sort_by("price", crate::find_options::SortDirection::Descending)
            .with_skip(1)
            .with_limit(1)
            .with_fields(&["title"]);
        let docs = collection.find_with_options(&json!({}), &options).unwrap();
        assert_eq!(docs, vec![json!({"title": "Animal Farm"})]);
    }
}
