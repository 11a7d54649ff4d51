// src/index.rs
// Ordered secondary indexes (single-field and compound)

use crate::document::DocumentId;
use crate::error::{Result, ShelfError};
use crate::find_options::SortDirection;
use crate::value_utils::{canonical_json_string, get_nested_value};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Index key - variant order is the key ordering
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexKey {
    MinKey,
    Null,
    Number(OrderedFloat),
    String(String),
    Bool(bool),
    /// Objects (and nested arrays) keyed by their canonical JSON text
    Composite(String),
    MaxKey,
}

/// OrderedFloat wrapper for f64 to enable Ord
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Convert serde_json::Value to IndexKey. Integers and floats share one
/// numeric domain so `10` and `10.0` land on the same key.
impl From<&Value> for IndexKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => IndexKey::Null,
            Value::Bool(b) => IndexKey::Bool(*b),
            Value::Number(n) => {
                let f = n.as_f64().unwrap_or(0.0);
                // -0.0 and 0.0 are the same key
                IndexKey::Number(OrderedFloat(if f == 0.0 { 0.0 } else { f }))
            }
            Value::String(s) => IndexKey::String(s.clone()),
            other => IndexKey::Composite(canonical_json_string(other)),
        }
    }
}

/// Index specification: ordered key fields with a direction each
#[derive(Debug, Clone, PartialEq)]
pub struct IndexModel {
    pub keys: Vec<(String, SortDirection)>,
    pub unique: bool,
    pub name: Option<String>,
}

impl IndexModel {
    pub fn new(keys: Vec<(String, SortDirection)>) -> Self {
        IndexModel {
            keys,
            unique: false,
            name: None,
        }
    }

    pub fn ascending(field: &str) -> Self {
        Self::new(vec![(field.to_string(), SortDirection::Ascending)])
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Parse a key document such as `{"author": 1, "published_year": -1}`
    pub fn from_json(keys: &Value) -> Result<Self> {
        let Value::Object(obj) = keys else {
            return Err(ShelfError::IndexError(
                "Index keys must be an object".to_string(),
            ));
        };
        let keys = obj
            .iter()
            .map(|(field, dir)| {
                let direction = dir
                    .as_i64()
                    .and_then(|n| SortDirection::from_i64(n).ok())
                    .ok_or_else(|| {
                        ShelfError::IndexError(format!(
                            "Index direction for '{}' must be 1 or -1",
                            field
                        ))
                    })?;
                Ok((field.clone(), direction))
            })
            .collect::<Result<Vec<_>>>()?;
        let model = Self::new(keys);
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<()> {
        if self.keys.is_empty() {
            return Err(ShelfError::IndexError(
                "Index must have at least one key field".to_string(),
            ));
        }
        for (i, (field, _)) in self.keys.iter().enumerate() {
            if field.is_empty() {
                return Err(ShelfError::IndexError(
                    "Index field names cannot be empty".to_string(),
                ));
            }
            if self.keys[..i].iter().any(|(f, _)| f == field) {
                return Err(ShelfError::IndexError(format!(
                    "Index field '{}' appears more than once",
                    field
                )));
            }
        }
        if matches!(self.name.as_deref(), Some("")) {
            return Err(ShelfError::IndexError(
                "Index name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Explicit name, or `field_dir` pairs joined by `_` (`author_1_published_year_-1`)
    pub fn index_name(&self) -> String {
        if let Some(ref name) = self.name {
            return name.clone();
        }
        self.keys
            .iter()
            .map(|(field, dir)| format!("{}_{}", field, dir.as_i64()))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Key pattern as a JSON document, in field order
    pub fn key_pattern(&self) -> Value {
        let mut pattern = serde_json::Map::new();
        for (field, dir) in &self.keys {
            pattern.insert(field.clone(), Value::from(dir.as_i64()));
        }
        Value::Object(pattern)
    }

    pub fn leading_field(&self) -> &str {
        self.keys.first().map(|(f, _)| f.as_str()).unwrap_or("")
    }
}

/// Bounds on the leading index field
#[derive(Debug, Clone, PartialEq)]
pub enum KeyBounds {
    /// Equality or `$in` point lookups
    Points(Vec<IndexKey>),
    Range {
        lower: Bound<IndexKey>,
        upper: Bound<IndexKey>,
    },
}

/// Candidate ids from an index scan plus the number of keys examined
#[derive(Debug, Default)]
pub struct IndexScan {
    pub ids: BTreeSet<DocumentId>,
    pub keys_examined: usize,
}

/// One index over a collection.
///
/// Entries are keyed by the full key tuple, one entry per array element
/// when a field holds an array (multikey).
#[derive(Debug, Clone)]
pub struct CollectionIndex {
    model: IndexModel,
    name: String,
    entries: BTreeMap<Vec<IndexKey>, BTreeSet<DocumentId>>,
}

impl CollectionIndex {
    pub fn new(model: IndexModel) -> Self {
        let name = model.index_name();
        CollectionIndex {
            model,
            name,
            entries: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &IndexModel {
        &self.model
    }

    /// Number of distinct key tuples
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// All key tuples a document contributes
    pub fn extract_keys(&self, doc: &Value) -> Result<Vec<Vec<IndexKey>>> {
        let mut per_field: Vec<Vec<IndexKey>> = Vec::with_capacity(self.model.keys.len());
        let mut array_fields = 0;

        for (field, _) in &self.model.keys {
            let keys = match get_nested_value(doc, field) {
                None => vec![IndexKey::Null],
                Some(Value::Array(items)) => {
                    array_fields += 1;
                    let mut keys: Vec<IndexKey> = items.iter().map(IndexKey::from).collect();
                    keys.sort();
                    keys.dedup();
                    if keys.is_empty() {
                        keys.push(IndexKey::Null);
                    }
                    keys
                }
                Some(value) => vec![IndexKey::from(value)],
            };
            per_field.push(keys);
        }

        if array_fields > 1 {
            return Err(ShelfError::IndexError(format!(
                "cannot index parallel arrays in index '{}'",
                self.name
            )));
        }

        let mut tuples: Vec<Vec<IndexKey>> = vec![Vec::new()];
        for keys in per_field {
            let mut next = Vec::with_capacity(tuples.len() * keys.len());
            for prefix in &tuples {
                for key in &keys {
                    let mut tuple = prefix.clone();
                    tuple.push(key.clone());
                    next.push(tuple);
                }
            }
            tuples = next;
        }
        Ok(tuples)
    }

    /// Check that inserting `doc` under `id` would not break a unique constraint
    pub fn check_insert(&self, id: &DocumentId, doc: &Value) -> Result<Vec<Vec<IndexKey>>> {
        let keys = self.extract_keys(doc)?;
        if self.model.unique {
            for key in &keys {
                if let Some(ids) = self.entries.get(key) {
                    if ids.iter().any(|existing| existing != id) {
                        return Err(ShelfError::IndexError(format!(
                            "duplicate key in unique index '{}': {:?}",
                            self.name, key
                        )));
                    }
                }
            }
        }
        Ok(keys)
    }

    pub fn insert(&mut self, id: &DocumentId, doc: &Value) -> Result<()> {
        let keys = self.check_insert(id, doc)?;
        for key in keys {
            self.entries.entry(key).or_default().insert(id.clone());
        }
        Ok(())
    }

    pub fn remove(&mut self, id: &DocumentId, doc: &Value) {
        // A document that failed key extraction was never indexed
        let Ok(keys) = self.extract_keys(doc) else {
            return;
        };
        for key in keys {
            if let Some(ids) = self.entries.get_mut(&key) {
                ids.remove(id);
                if ids.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    /// Scan entries whose leading key falls within `bounds`
    pub fn scan(&self, bounds: &KeyBounds) -> IndexScan {
        let mut scan = IndexScan::default();
        match bounds {
            KeyBounds::Points(points) => {
                for point in points {
                    let lower = Bound::Included(vec![point.clone()]);
                    let upper = Bound::Excluded(vec![point.clone(), IndexKey::MaxKey]);
                    self.collect_range(lower, upper, &mut scan);
                }
            }
            KeyBounds::Range { lower, upper } => {
                let lower = match lower {
                    Bound::Included(k) => Bound::Included(vec![k.clone()]),
                    Bound::Excluded(k) => Bound::Excluded(vec![k.clone(), IndexKey::MaxKey]),
                    Bound::Unbounded => Bound::Unbounded,
                };
                let upper = match upper {
                    Bound::Included(k) => Bound::Excluded(vec![k.clone(), IndexKey::MaxKey]),
                    Bound::Excluded(k) => Bound::Excluded(vec![k.clone()]),
                    Bound::Unbounded => Bound::Unbounded,
                };
                self.collect_range(lower, upper, &mut scan);
            }
        }
        scan
    }

    fn collect_range(
        &self,
        lower: Bound<Vec<IndexKey>>,
        upper: Bound<Vec<IndexKey>>,
        scan: &mut IndexScan,
    ) {
        if is_empty_range(&lower, &upper) {
            return;
        }
        for (_, ids) in self.entries.range((lower, upper)) {
            scan.keys_examined += 1;
            scan.ids.extend(ids.iter().cloned());
        }
    }
}

/// `BTreeMap::range` rejects inverted bounds; treat them as empty
fn is_empty_range(lower: &Bound<Vec<IndexKey>>, upper: &Bound<Vec<IndexKey>>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
        _ => false,
    }
}

/// Index Manager - manages all indexes for a collection
#[derive(Debug, Clone, Default)]
pub struct IndexManager {
    indexes: Vec<CollectionIndex>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index over `docs`.
    ///
    /// Returns the index name. Re-creating an identical index is a no-op;
    /// a different definition under an existing name (or the same keys
    /// under another name) is an error.
    pub fn create_index<'a, I>(&mut self, model: IndexModel, docs: I) -> Result<String>
    where
        I: IntoIterator<Item = (&'a DocumentId, &'a Value)>,
    {
        model.validate()?;
        let name = model.index_name();

        if let Some(existing) = self.indexes.iter().find(|idx| idx.name == name) {
            if existing.model.keys == model.keys && existing.model.unique == model.unique {
                return Ok(name);
            }
            return Err(ShelfError::IndexError(format!(
                "An index named '{}' already exists with a different definition",
                name
            )));
        }
        if let Some(existing) = self.indexes.iter().find(|idx| idx.model.keys == model.keys) {
            return Err(ShelfError::IndexError(format!(
                "Index with the same key pattern already exists as '{}'",
                existing.name
            )));
        }

        let mut index = CollectionIndex::new(model);
        for (id, doc) in docs {
            index.insert(id, doc)?;
        }
        self.indexes.push(index);
        Ok(name)
    }

    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        let before = self.indexes.len();
        self.indexes.retain(|idx| idx.name != name);
        if self.indexes.len() == before {
            return Err(ShelfError::IndexError(format!("Index not found: {}", name)));
        }
        Ok(())
    }

    pub fn get_index(&self, name: &str) -> Option<&CollectionIndex> {
        self.indexes.iter().find(|idx| idx.name == name)
    }

    /// Indexes in creation order
    pub fn indexes(&self) -> &[CollectionIndex] {
        &self.indexes
    }

    pub fn list_indexes(&self) -> Vec<String> {
        self.indexes.iter().map(|idx| idx.name.clone()).collect()
    }

    pub fn models(&self) -> Vec<IndexModel> {
        self.indexes.iter().map(|idx| idx.model.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.indexes.clear();
    }

    /// Index a new document; nothing changes if any index rejects it
    pub fn on_insert(&mut self, id: &DocumentId, doc: &Value) -> Result<()> {
        for index in &self.indexes {
            index.check_insert(id, doc)?;
        }
        for index in &mut self.indexes {
            index.insert(id, doc)?;
        }
        Ok(())
    }

    pub fn on_remove(&mut self, id: &DocumentId, doc: &Value) {
        for index in &mut self.indexes {
            index.remove(id, doc);
        }
    }

    /// Re-index an updated document, restoring the old entries on failure
    pub fn on_update(&mut self, id: &DocumentId, old: &Value, new: &Value) -> Result<()> {
        self.on_remove(id, old);
        if let Err(e) = self.on_insert(id, new) {
            for index in &mut self.indexes {
                // The old document was indexed before, so this cannot fail
                let _ = index.insert(id, old);
            }
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs() -> Vec<(DocumentId, Value)> {
        vec![
            (DocumentId::Int(1), json!({"title": "1984", "author": "George Orwell", "published_year": 1949})),
            (DocumentId::Int(2), json!({"title": "Animal Farm", "author": "George Orwell", "published_year": 1945})),
            (DocumentId::Int(3), json!({"title": "Beloved", "author": "Toni Morrison", "published_year": 1987})),
            (DocumentId::Int(4), json!({"author": "Anonymous"})),
        ]
    }

    fn build(model: IndexModel) -> IndexManager {
        let docs = docs();
        let mut manager = IndexManager::new();
        manager
            .create_index(model, docs.iter().map(|(id, d)| (id, d)))
            .unwrap();
        manager
    }

    #[test]
    fn test_index_names() {
        assert_eq!(IndexModel::ascending("title").index_name(), "title_1");
        let compound = IndexModel::from_json(&json!({"author": 1, "published_year": -1})).unwrap();
        assert_eq!(compound.index_name(), "author_1_published_year_-1");
        assert_eq!(compound.key_pattern(), json!({"author": 1, "published_year": -1}));
        assert_eq!(
            IndexModel::ascending("title").with_name("by_title").index_name(),
            "by_title"
        );
    }

    #[test]
    fn test_index_model_validation() {
        assert!(IndexModel::from_json(&json!({})).is_err());
        assert!(IndexModel::from_json(&json!({"title": 2})).is_err());
        assert!(IndexModel::from_json(&json!(["title"])).is_err());
        assert!(IndexModel::new(vec![
            ("a".to_string(), SortDirection::Ascending),
            ("a".to_string(), SortDirection::Descending),
        ])
        .validate()
        .is_err());
    }

    #[test]
    fn test_numeric_keys_unify() {
        assert_eq!(IndexKey::from(&json!(10)), IndexKey::from(&json!(10.0)));
        assert!(IndexKey::from(&json!(null)) < IndexKey::from(&json!(-5)));
        assert!(IndexKey::from(&json!(99)) < IndexKey::from(&json!("a")));
    }

    #[test]
    fn test_point_scan_single_field() {
        let manager = build(IndexModel::ascending("title"));
        let index = manager.get_index("title_1").unwrap();

        let scan = index.scan(&KeyBounds::Points(vec![IndexKey::from(&json!("1984"))]));
        assert_eq!(scan.ids.into_iter().collect::<Vec<_>>(), vec![DocumentId::Int(1)]);
        assert_eq!(scan.keys_examined, 1);

        // Missing title is indexed as null
        let scan = index.scan(&KeyBounds::Points(vec![IndexKey::Null]));
        assert!(scan.ids.contains(&DocumentId::Int(4)));
    }

    #[test]
    fn test_range_scan_on_compound_leading_field() {
        let manager = build(IndexModel::from_json(&json!({"published_year": 1, "author": 1})).unwrap());
        let index = &manager.indexes()[0];

        let scan = index.scan(&KeyBounds::Range {
            lower: Bound::Excluded(IndexKey::from(&json!(1945))),
            upper: Bound::Included(IndexKey::from(&json!(1987))),
        });
        let ids: Vec<_> = scan.ids.into_iter().collect();
        assert_eq!(ids, vec![DocumentId::Int(1), DocumentId::Int(3)]);

        // Inverted bounds are empty, not a panic
        let scan = index.scan(&KeyBounds::Range {
            lower: Bound::Excluded(IndexKey::from(&json!(2000))),
            upper: Bound::Excluded(IndexKey::from(&json!(1900))),
        });
        assert!(scan.ids.is_empty());
    }

    #[test]
    fn test_create_index_idempotent_and_conflicts() {
        let docs = docs();
        let mut manager = IndexManager::new();
        let iter = || docs.iter().map(|(id, d)| (id, d));

        assert_eq!(manager.create_index(IndexModel::ascending("title"), iter()).unwrap(), "title_1");
        assert_eq!(manager.create_index(IndexModel::ascending("title"), iter()).unwrap(), "title_1");
        assert_eq!(manager.list_indexes(), vec!["title_1".to_string()]);

        let conflicting = IndexModel::ascending("title").with_unique(true);
        assert!(matches!(
            manager.create_index(conflicting, iter()),
            Err(ShelfError::IndexError(_))
        ));

        let renamed = IndexModel::ascending("title").with_name("other");
        assert!(manager.create_index(renamed, iter()).is_err());
    }

    #[test]
    fn test_unique_index_rejects_duplicates() {
        let docs = docs();
        let mut manager = IndexManager::new();
        let result = manager.create_index(
            IndexModel::ascending("author").with_unique(true),
            docs.iter().map(|(id, d)| (id, d)),
        );
        assert!(matches!(result, Err(ShelfError::IndexError(_))));
        assert!(manager.list_indexes().is_empty());

        manager
            .create_index(IndexModel::ascending("title").with_unique(true), docs.iter().map(|(id, d)| (id, d)))
            .unwrap();
        let dup = json!({"title": "Beloved"});
        assert!(manager.on_insert(&DocumentId::Int(9), &dup).is_err());
        assert!(manager.on_insert(&DocumentId::Int(9), &json!({"title": "Emma"})).is_ok());
    }

    #[test]
    fn test_on_update_restores_on_failure() {
        let docs = docs();
        let mut manager = IndexManager::new();
        manager
            .create_index(IndexModel::ascending("title").with_unique(true), docs.iter().map(|(id, d)| (id, d)))
            .unwrap();

        let old = docs[0].1.clone();
        let new = json!({"title": "Beloved"});
        assert!(manager.on_update(&DocumentId::Int(1), &old, &new).is_err());

        let index = manager.get_index("title_1").unwrap();
        let scan = index.scan(&KeyBounds::Points(vec![IndexKey::from(&json!("1984"))]));
        assert!(scan.ids.contains(&DocumentId::Int(1)));
    }

    #[test]
    fn test_multikey_and_parallel_arrays() {
        let mut manager = IndexManager::new();
        manager.create_index(IndexModel::ascending("tags"), std::iter::empty()).unwrap();
        manager
            .on_insert(&DocumentId::Int(1), &json!({"tags": ["classic", "dystopia"]}))
            .unwrap();

        let index = manager.get_index("tags_1").unwrap();
        let scan = index.scan(&KeyBounds::Points(vec![IndexKey::from(&json!("dystopia"))]));
        assert!(scan.ids.contains(&DocumentId::Int(1)));

        let compound = CollectionIndex::new(IndexModel::from_json(&json!({"a": 1, "b": 1})).unwrap());
        assert!(compound.extract_keys(&json!({"a": [1, 2], "b": [3]})).is_err());
    }

    #[test]
    fn test_drop_index() {
        let mut manager = build(IndexModel::ascending("title"));
        manager.drop_index("title_1").unwrap();
        assert!(manager.drop_index("title_1").is_err());
    }
}
