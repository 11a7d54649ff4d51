// src/query.rs
//! MongoDB-style query filters
//!
//! `Query` is a validated wrapper around a JSON filter. Matching is done by
//! the operator registry in [`operators`].

pub mod operators;

use crate::document::Document;
use crate::error::Result;
use serde_json::Value;

pub use operators::{matches_filter, validate_filter};

/// A filter that has passed structural validation
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    json: Value,
}

impl Query {
    /// Empty query (matches all documents)
    pub fn new() -> Self {
        Query {
            json: Value::Object(serde_json::Map::new()),
        }
    }

    /// Validate and wrap a JSON filter
    ///
    /// ```
    /// use serde_json::json;
    /// use shelfbase_core::Query;
    ///
    /// assert!(Query::from_json(&json!({"published_year": {"$gt": 1950}})).is_ok());
    /// assert!(Query::from_json(&json!({"published_year": {"$after": 1950}})).is_err());
    /// ```
    pub fn from_json(json: &Value) -> Result<Self> {
        validate_filter(json)?;
        Ok(Query { json: json.clone() })
    }

    pub fn matches(&self, document: &Document) -> Result<bool> {
        matches_filter(document, &self.json)
    }

    pub fn is_empty(&self) -> bool {
        self.json.as_object().map(|o| o.is_empty()).unwrap_or(false)
    }

    pub fn to_json(&self) -> &Value {
        &self.json
    }

    pub fn into_json(self) -> Value {
        self.json
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}
