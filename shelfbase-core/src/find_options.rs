// shelfbase-core/src/find_options.rs
// Find query options: projection, sort, skip, limit

use crate::error::{Result, ShelfError};
use crate::value_utils::{get_nested_value, set_nested_value, sort_order};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// 1 → ascending, -1 → descending
    pub fn from_i64(n: i64) -> Result<Self> {
        match n {
            1 => Ok(SortDirection::Ascending),
            -1 => Ok(SortDirection::Descending),
            _ => Err(ShelfError::InvalidQuery(
                "Sort direction must be 1 or -1".to_string(),
            )),
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// Options for find queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// field → 1 (include) or 0 (exclude). `_id` is included unless excluded.
    pub projection: Option<HashMap<String, i32>>,

    /// Sort keys in priority order
    pub sort: Option<Vec<(String, SortDirection)>>,

    /// Maximum number of documents to return; `Some(0)` returns nothing
    pub limit: Option<usize>,

    /// Number of documents to skip (for pagination)
    pub skip: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projection(mut self, projection: HashMap<String, i32>) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Include-mode projection of exactly `fields`; `_id` is dropped unless listed
    pub fn with_fields(self, fields: &[&str]) -> Self {
        let mut projection: HashMap<String, i32> =
            fields.iter().map(|f| (f.to_string(), 1)).collect();
        projection.entry("_id".to_string()).or_insert(0);
        self.with_projection(projection)
    }

    pub fn with_sort(mut self, sort: Vec<(String, SortDirection)>) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn sort_by(self, field: &str, direction: SortDirection) -> Self {
        self.with_sort(vec![(field.to_string(), direction)])
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Reject projections that mix inclusion and exclusion and empty sort keys
    pub fn validate(&self) -> Result<()> {
        if let Some(ref projection) = self.projection {
            if let Some((field, value)) = projection.iter().find(|(_, v)| !matches!(v, 0 | 1)) {
                return Err(ShelfError::InvalidQuery(format!(
                    "Projection value for '{}' must be 0 or 1, got {}",
                    field, value
                )));
            }
            let has_inclusions = projection.values().any(|&v| v == 1);
            let has_non_id_exclusions = projection
                .iter()
                .any(|(field, &v)| v == 0 && field != "_id");
            if has_inclusions && has_non_id_exclusions {
                return Err(ShelfError::InvalidQuery(
                    "Projection cannot mix inclusion and exclusion".to_string(),
                ));
            }
        }

        if let Some(ref sort) = self.sort {
            if sort.iter().any(|(field, _)| field.is_empty()) {
                return Err(ShelfError::InvalidQuery(
                    "Sort field names cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Apply projection to a document.
/// Supports dot notation for nested fields (e.g. "publisher.city").
pub fn apply_projection(doc: &Value, projection: &HashMap<String, i32>) -> Value {
    if projection.is_empty() {
        return doc.clone();
    }

    let include_mode = projection.values().any(|&v| v == 1);

    let Value::Object(obj) = doc else {
        return doc.clone();
    };

    let mut result = Value::Object(serde_json::Map::new());

    if include_mode {
        // Output follows the document's field order
        let position = |field: &str| {
            let top = field.split('.').next().unwrap_or(field);
            obj.keys().position(|k| k == top).unwrap_or(usize::MAX)
        };
        let mut included: Vec<&String> = projection
            .iter()
            .filter(|(_, &action)| action == 1)
            .map(|(field, _)| field)
            .collect();
        included.sort_by(|a, b| position(a).cmp(&position(b)).then_with(|| a.cmp(b)));

        for field in included {
            if let Some(value) = get_nested_value(doc, field) {
                set_nested_value(&mut result, field, value.clone());
            }
        }

        if projection.get("_id") != Some(&0) {
            if let Some(id) = obj.get("_id") {
                set_nested_value(&mut result, "_id", id.clone());
            }
        }
    } else if let Value::Object(ref mut out) = result {
        // Exclusion only applies to top-level fields
        for (key, value) in obj {
            if projection.get(key) != Some(&0) {
                out.insert(key.clone(), value.clone());
            }
        }
    }

    result
}

/// Stable multi-key sort; documents with equal keys keep their input order
pub fn apply_sort(docs: &mut [Value], sort: &[(String, SortDirection)]) {
    if sort.is_empty() {
        return;
    }

    docs.sort_by(|a, b| {
        for (field, direction) in sort {
            let cmp = sort_order(get_nested_value(a, field), get_nested_value(b, field));
            if cmp != std::cmp::Ordering::Equal {
                return match direction {
                    SortDirection::Ascending => cmp,
                    SortDirection::Descending => cmp.reverse(),
                };
            }
        }
        std::cmp::Ordering::Equal
    });
}

/// Skip then limit. Out-of-range skip yields an empty result, never an error.
pub fn apply_limit_skip(docs: Vec<Value>, limit: Option<usize>, skip: Option<usize>) -> Vec<Value> {
    let skip_count = skip.unwrap_or(0);
    let iter = docs.into_iter().skip(skip_count);
    match limit {
        Some(limit_count) => iter.take(limit_count).collect(),
        None => iter.collect(),
    }
}
