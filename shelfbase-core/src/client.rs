// shelfbase-core/src/client.rs
//! The collection API the report generator consumes
//!
//! Reports only ever see a [`DocumentCollection`]; the embedded
//! [`CollectionCore`] is one implementation, test doubles are another.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collection_core::CollectionCore;
use crate::error::Result;
use crate::find_options::FindOptions;
use crate::index::IndexModel;
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Query and write operations on a single collection of documents
pub trait DocumentCollection {
    fn find(&self, filter: &Value, options: &FindOptions) -> Result<Vec<Value>>;

    fn aggregate(&self, pipeline: &Value) -> Result<Vec<Value>>;

    /// Update the first match in natural order
    fn update_one(&self, filter: &Value, update: &Value) -> Result<UpdateResult>;

    /// Delete the first match in natural order
    fn delete_one(&self, filter: &Value) -> Result<DeleteResult>;

    /// Returns the index name
    fn create_index(&self, model: IndexModel) -> Result<String>;

    fn explain(&self, filter: &Value) -> Result<Value>;

    /// `<database>.<collection>`
    fn namespace(&self) -> String;
}

impl<S: Storage> DocumentCollection for CollectionCore<S> {
    fn find(&self, filter: &Value, options: &FindOptions) -> Result<Vec<Value>> {
        self.find_with_options(filter, options)
    }

    fn aggregate(&self, pipeline: &Value) -> Result<Vec<Value>> {
        CollectionCore::aggregate(self, pipeline)
    }

    fn update_one(&self, filter: &Value, update: &Value) -> Result<UpdateResult> {
        let (matched_count, modified_count) = CollectionCore::update_one(self, filter, update)?;
        Ok(UpdateResult {
            matched_count,
            modified_count,
        })
    }

    fn delete_one(&self, filter: &Value) -> Result<DeleteResult> {
        Ok(DeleteResult {
            deleted_count: CollectionCore::delete_one(self, filter)?,
        })
    }

    fn create_index(&self, model: IndexModel) -> Result<String> {
        CollectionCore::create_index(self, model)
    }

    fn explain(&self, filter: &Value) -> Result<Value> {
        CollectionCore::explain(self, filter)
    }

    fn namespace(&self) -> String {
        CollectionCore::namespace(self).to_string()
    }
}
