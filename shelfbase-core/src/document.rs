// shelfbase-core/src/document.rs
// Stored documents and the typed book record view

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{Result, ShelfError};
use crate::value_utils::{get_nested_value, remove_nested_value, set_nested_value};

/// Document identifier
///
/// Untagged so it appears as a plain value inside documents: `{"_id": 2}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum DocumentId {
    Int(i64),
    String(String),
}

impl DocumentId {
    /// Next auto-increment ID
    pub fn new_auto(last_id: u64) -> Self {
        DocumentId::Int((last_id + 1) as i64)
    }

    pub fn to_value(&self) -> Value {
        match self {
            DocumentId::Int(i) => Value::from(*i),
            DocumentId::String(s) => Value::from(s.clone()),
        }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(DocumentId::Int).ok_or_else(|| {
                ShelfError::Serialization(format!("_id must be an integer or string, got {}", n))
            }),
            Value::String(s) => Ok(DocumentId::String(s.clone())),
            other => Err(ShelfError::Serialization(format!(
                "_id must be an integer or string, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Int(i) => write!(f, "{}", i),
            DocumentId::String(s) => f.write_str(s),
        }
    }
}

/// A stored JSON document.
///
/// The body is always a JSON object and always carries `_id`, so query
/// matching can treat `_id` like any other field.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    body: Value,
}

impl Document {
    /// Build a document from an id and its remaining fields
    pub fn new(id: DocumentId, mut fields: Map<String, Value>) -> Self {
        fields.insert("_id".to_string(), id.to_value());
        Document {
            id,
            body: Value::Object(fields),
        }
    }

    /// Build a document from a JSON object that already contains `_id`
    pub fn from_value(value: Value) -> Result<Self> {
        let id = match value.as_object() {
            Some(obj) => match obj.get("_id") {
                Some(id_value) => DocumentId::from_value(id_value)?,
                None => {
                    return Err(ShelfError::Serialization(
                        "Document is missing _id".to_string(),
                    ))
                }
            },
            None => {
                return Err(ShelfError::Serialization(
                    "Document must be an object".to_string(),
                ))
            }
        };
        Ok(Document { id, body: value })
    }

    /// Wrap an intermediate pipeline result for filter matching.
    /// The body is kept as-is, whatever `_id` it carries (or none).
    pub(crate) fn from_pipeline_value(body: Value) -> Self {
        let id = body
            .get("_id")
            .and_then(|v| DocumentId::from_value(v).ok())
            .unwrap_or(DocumentId::Int(0));
        Document { id, body }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.body)?)
    }

    /// Whole document as a JSON value (includes `_id`)
    pub fn as_value(&self) -> &Value {
        &self.body
    }

    pub fn into_value(self) -> Value {
        self.body
    }

    /// Field lookup with dot notation
    pub fn get(&self, field: &str) -> Option<&Value> {
        if field.is_empty() {
            return None;
        }
        get_nested_value(&self.body, field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Set a field (dot notation creates intermediate objects). `_id` is immutable.
    pub fn set(&mut self, field: &str, value: Value) -> Result<()> {
        if field == "_id" {
            return Err(ShelfError::WriteRejected(
                "the _id field is immutable".to_string(),
            ));
        }
        set_nested_value(&mut self.body, field, value);
        Ok(())
    }

    pub fn remove(&mut self, field: &str) -> Result<Option<Value>> {
        if field == "_id" {
            return Err(ShelfError::WriteRejected(
                "the _id field is immutable".to_string(),
            ));
        }
        Ok(remove_nested_value(&mut self.body, field))
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

/// Typed view of a book document. Every field is optional because stored
/// documents are schemaless.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
}

impl BookRecord {
    pub fn new(title: &str, author: &str, genre: &str, published_year: i64, price: f64) -> Self {
        BookRecord {
            title: Some(title.to_string()),
            author: Some(author.to_string()),
            genre: Some(genre.to_string()),
            published_year: Some(published_year),
            price: Some(price),
            in_stock: Some(true),
            ..Default::default()
        }
    }

    pub fn with_in_stock(mut self, in_stock: bool) -> Self {
        self.in_stock = Some(in_stock);
        self
    }

    /// Field map ready for insertion (absent fields are omitted, not null)
    pub fn to_fields(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(ShelfError::Serialization(
                "BookRecord did not serialize to an object".to_string(),
            )),
        }
    }

    /// Read the typed view back from a stored or projected document.
    /// Unknown fields such as `_id` are ignored.
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}
