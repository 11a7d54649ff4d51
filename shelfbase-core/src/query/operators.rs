// src/query/operators.rs
//! Query operator implementations
//!
//! Each operator is a separate type implementing `OperatorMatcher` and is
//! looked up by name in `OPERATOR_REGISTRY`.
//!
//! ```text
//! OperatorMatcher trait
//!     ↓
//! ┌────────────────┬────────────────┬────────────────┐
//! │ Comparison     │ Logical        │ Element        │
//! │ ($eq, $gt...)  │ ($and, $or...) │ ($exists...)   │
//! └────────────────┴────────────────┴────────────────┘
//! ```
//!
//! A field that is missing from the document never satisfies a comparison,
//! `$in`, `$type` or `$regex` clause. Only `$ne`, `$nin` and
//! `$exists: false` match a missing field.

use crate::document::Document;
use crate::error::{Result, ShelfError};
use crate::value_utils::compare_values;
use lazy_static::lazy_static;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::num::NonZeroUsize;

// ============================================================================
// REGEX SUPPORT
// ============================================================================

lazy_static! {
    /// Compiled patterns keyed by "options:pattern"
    static ref REGEX_CACHE: Mutex<LruCache<String, Regex>> = Mutex::new(LruCache::new(
        NonZeroUsize::new(64).unwrap_or(NonZeroUsize::MIN)
    ));
}

/// Convert MongoDB-style options (i, m, s, x) into inline regex flags
fn build_regex_pattern(pattern: &str, options: &str) -> String {
    let flags: String = options
        .chars()
        .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
        .collect();

    if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", flags, pattern)
    }
}

fn get_or_compile_regex(pattern: &str, options: &str) -> Result<Regex> {
    let cache_key = format!("{}:{}", options, pattern);

    if let Some(regex) = REGEX_CACHE.lock().get(&cache_key) {
        return Ok(regex.clone());
    }

    let regex = Regex::new(&build_regex_pattern(pattern, options)).map_err(|e| {
        ShelfError::InvalidQuery(format!("Invalid regex pattern '{}': {}", pattern, e))
    })?;

    REGEX_CACHE.lock().put(cache_key, regex.clone());
    Ok(regex)
}

fn regex_matches(doc_value: Option<&Value>, pattern: &str, options: &str) -> Result<bool> {
    let regex = get_or_compile_regex(pattern, options)?;
    Ok(match doc_value {
        Some(Value::String(s)) => regex.is_match(s),
        Some(Value::Array(arr)) => arr
            .iter()
            .any(|elem| elem.as_str().map(|s| regex.is_match(s)).unwrap_or(false)),
        _ => false,
    })
}

// ============================================================================
// TRAIT DEFINITION
// ============================================================================

/// A single query operator ($eq, $gt, $and, ...)
///
/// ```rust
/// use serde_json::json;
/// use shelfbase_core::query::operators::{EqOperator, OperatorMatcher};
///
/// let matches = EqOperator.matches(Some(&json!("Fiction")), &json!("Fiction"), None).unwrap();
/// assert!(matches);
/// ```
pub trait OperatorMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Logical operators take sub-filters instead of a field value
    fn is_logical(&self) -> bool {
        false
    }

    /// Check the operator argument before any document is examined
    fn validate(&self, _filter_value: &Value) -> Result<()> {
        Ok(())
    }

    /// - `doc_value`: the field value (None if the field is missing)
    /// - `filter_value`: the operator argument
    /// - `document`: the whole document, needed by logical operators
    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Document>,
    ) -> Result<bool>;
}

/// Equality that treats `10` and `10.0` as the same number
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Equality with MongoDB array semantics: an array field matches if any element does
fn equals_or_contains(doc_value: &Value, filter_value: &Value) -> bool {
    if values_equal(doc_value, filter_value) {
        return true;
    }
    match doc_value {
        Value::Array(arr) => arr.iter().any(|elem| values_equal(elem, filter_value)),
        _ => false,
    }
}

fn compare_with_predicate<F>(doc_value: Option<&Value>, filter_value: &Value, predicate: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    let Some(v) = doc_value else {
        return false;
    };
    if let Some(ordering) = compare_values(v, filter_value) {
        if predicate(ordering) {
            return true;
        }
    }
    match v {
        Value::Array(arr) => arr.iter().any(|elem| {
            compare_values(elem, filter_value)
                .map(&predicate)
                .unwrap_or(false)
        }),
        _ => false,
    }
}

fn require_array<'a>(op: &str, value: &'a Value) -> Result<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| ShelfError::InvalidQuery(format!("{} operator requires an array", op)))
}

// ============================================================================
// COMPARISON OPERATORS
// ============================================================================

/// `{ field: { $eq: value } }`, shorthand `{ field: value }`
pub struct EqOperator;

impl OperatorMatcher for EqOperator {
    fn name(&self) -> &'static str {
        "$eq"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        _document: Option<&Document>,
    ) -> Result<bool> {
        Ok(match doc_value {
            Some(v) => equals_or_contains(v, filter_value),
            // { field: null } matches a missing field
            None => filter_value.is_null(),
        })
    }
}

/// `{ field: { $ne: value } }`; a missing field is "not equal"
pub struct NeOperator;

impl OperatorMatcher for NeOperator {
    fn name(&self) -> &'static str {
        "$ne"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Document>,
    ) -> Result<bool> {
        Ok(!EqOperator.matches(doc_value, filter_value, document)?)
    }
}

macro_rules! range_operator {
    ($ty:ident, $name:literal, $pred:expr) => {
        pub struct $ty;

        impl OperatorMatcher for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            fn validate(&self, filter_value: &Value) -> Result<()> {
                if filter_value.is_object() || filter_value.is_array() {
                    return Err(ShelfError::InvalidQuery(format!(
                        "{} requires a scalar value",
                        $name
                    )));
                }
                Ok(())
            }

            fn matches(
                &self,
                doc_value: Option<&Value>,
                filter_value: &Value,
                _document: Option<&Document>,
            ) -> Result<bool> {
                Ok(compare_with_predicate(doc_value, filter_value, $pred))
            }
        }
    };
}

range_operator!(GtOperator, "$gt", |ord| ord == Ordering::Greater);
range_operator!(GteOperator, "$gte", |ord| ord != Ordering::Less);
range_operator!(LtOperator, "$lt", |ord| ord == Ordering::Less);
range_operator!(LteOperator, "$lte", |ord| ord != Ordering::Greater);

// ============================================================================
// SET MEMBERSHIP
// ============================================================================

/// `{ field: { $in: [v1, v2] } }`
pub struct InOperator;

impl OperatorMatcher for InOperator {
    fn name(&self) -> &'static str {
        "$in"
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        require_array("$in", filter_value).map(|_| ())
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        _document: Option<&Document>,
    ) -> Result<bool> {
        let candidates = require_array("$in", filter_value)?;
        Ok(match doc_value {
            Some(v) => candidates.iter().any(|c| equals_or_contains(v, c)),
            None => candidates.iter().any(Value::is_null),
        })
    }
}

/// `{ field: { $nin: [v1, v2] } }`; a missing field is "not in"
pub struct NinOperator;

impl OperatorMatcher for NinOperator {
    fn name(&self) -> &'static str {
        "$nin"
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        require_array("$nin", filter_value).map(|_| ())
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Document>,
    ) -> Result<bool> {
        Ok(!InOperator.matches(doc_value, filter_value, document)?)
    }
}

// ============================================================================
// ELEMENT OPERATORS
// ============================================================================

/// `{ field: { $exists: true|false } }`
pub struct ExistsOperator;

impl OperatorMatcher for ExistsOperator {
    fn name(&self) -> &'static str {
        "$exists"
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        if filter_value.is_boolean() {
            Ok(())
        } else {
            Err(ShelfError::InvalidQuery(
                "$exists operator requires a boolean".to_string(),
            ))
        }
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        _document: Option<&Document>,
    ) -> Result<bool> {
        self.validate(filter_value)?;
        Ok(doc_value.is_some() == filter_value.as_bool().unwrap_or(false))
    }
}

/// `{ field: { $type: "number" } }`
pub struct TypeOperator;

const TYPE_NAMES: &[&str] = &[
    "number", "double", "int", "long", "string", "object", "array", "bool", "boolean", "null",
];

impl OperatorMatcher for TypeOperator {
    fn name(&self) -> &'static str {
        "$type"
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        match filter_value.as_str() {
            Some(name) if TYPE_NAMES.contains(&name) => Ok(()),
            Some(name) => Err(ShelfError::InvalidQuery(format!(
                "Unknown type name: {}",
                name
            ))),
            None => Err(ShelfError::InvalidQuery(
                "$type operator requires a type name".to_string(),
            )),
        }
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        _document: Option<&Document>,
    ) -> Result<bool> {
        self.validate(filter_value)?;
        let Some(val) = doc_value else {
            return Ok(false);
        };

        Ok(match filter_value.as_str().unwrap_or_default() {
            "number" => val.is_number(),
            "double" => val.is_f64(),
            "int" | "long" => val.is_i64() || val.is_u64(),
            "string" => val.is_string(),
            "object" => val.is_object(),
            "array" => val.is_array(),
            "bool" | "boolean" => val.is_boolean(),
            "null" => val.is_null(),
            _ => false,
        })
    }
}

/// `{ field: { $regex: "pattern", $options: "i" } }`
pub struct RegexOperator;

impl OperatorMatcher for RegexOperator {
    fn name(&self) -> &'static str {
        "$regex"
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        let pattern = filter_value.as_str().ok_or_else(|| {
            ShelfError::InvalidQuery("$regex operator requires a string pattern".to_string())
        })?;
        get_or_compile_regex(pattern, "").map(|_| ())
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        _document: Option<&Document>,
    ) -> Result<bool> {
        let pattern = filter_value.as_str().ok_or_else(|| {
            ShelfError::InvalidQuery("$regex operator requires a string pattern".to_string())
        })?;
        regex_matches(doc_value, pattern, "")
    }
}

// ============================================================================
// LOGICAL OPERATORS
// ============================================================================

fn validate_clause_list(op: &str, filter_value: &Value) -> Result<()> {
    let clauses = require_array(op, filter_value)?;
    if clauses.is_empty() {
        return Err(ShelfError::InvalidQuery(format!(
            "{} operator requires a non-empty array",
            op
        )));
    }
    clauses.iter().try_for_each(validate_filter)
}

fn require_document<'a>(op: &str, document: Option<&'a Document>) -> Result<&'a Document> {
    document.ok_or_else(|| {
        ShelfError::InvalidQuery(format!("{} operator requires document context", op))
    })
}

/// `{ $and: [ {..}, {..} ] }`
pub struct AndOperator;

impl OperatorMatcher for AndOperator {
    fn name(&self) -> &'static str {
        "$and"
    }

    fn is_logical(&self) -> bool {
        true
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        validate_clause_list("$and", filter_value)
    }

    fn matches(
        &self,
        _doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Document>,
    ) -> Result<bool> {
        let doc = require_document("$and", document)?;
        for condition in require_array("$and", filter_value)? {
            if !matches_filter(doc, condition)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// `{ $or: [ {..}, {..} ] }`
pub struct OrOperator;

impl OperatorMatcher for OrOperator {
    fn name(&self) -> &'static str {
        "$or"
    }

    fn is_logical(&self) -> bool {
        true
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        validate_clause_list("$or", filter_value)
    }

    fn matches(
        &self,
        _doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Document>,
    ) -> Result<bool> {
        let doc = require_document("$or", document)?;
        for condition in require_array("$or", filter_value)? {
            if matches_filter(doc, condition)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// `{ $nor: [ {..}, {..} ] }`: true only if every clause is false
pub struct NorOperator;

impl OperatorMatcher for NorOperator {
    fn name(&self) -> &'static str {
        "$nor"
    }

    fn is_logical(&self) -> bool {
        true
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        validate_clause_list("$nor", filter_value)
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Document>,
    ) -> Result<bool> {
        Ok(!OrOperator.matches(doc_value, filter_value, document)?)
    }
}

/// `{ field: { $not: { $gt: 5 } } }`
pub struct NotOperator;

impl OperatorMatcher for NotOperator {
    fn name(&self) -> &'static str {
        "$not"
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        match filter_value {
            Value::Object(obj) if !obj.is_empty() && is_operator_object(obj) => {
                validate_condition(obj)
            }
            _ => Err(ShelfError::InvalidQuery(
                "$not operator requires an operator expression".to_string(),
            )),
        }
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Document>,
    ) -> Result<bool> {
        let condition = filter_value.as_object().ok_or_else(|| {
            ShelfError::InvalidQuery("$not operator requires an operator expression".to_string())
        })?;
        Ok(!matches_condition(doc_value, condition, document)?)
    }
}

// ============================================================================
// OPERATOR REGISTRY
// ============================================================================

lazy_static! {
    /// Every supported operator by name. Immutable after first use.
    pub static ref OPERATOR_REGISTRY: HashMap<&'static str, Box<dyn OperatorMatcher>> = {
        let operators: Vec<Box<dyn OperatorMatcher>> = vec![
            Box::new(EqOperator),
            Box::new(NeOperator),
            Box::new(GtOperator),
            Box::new(GteOperator),
            Box::new(LtOperator),
            Box::new(LteOperator),
            Box::new(InOperator),
            Box::new(NinOperator),
            Box::new(ExistsOperator),
            Box::new(TypeOperator),
            Box::new(RegexOperator),
            Box::new(AndOperator),
            Box::new(OrOperator),
            Box::new(NorOperator),
            Box::new(NotOperator),
        ];
        operators.into_iter().map(|op| (op.name(), op)).collect()
    };
}

fn lookup(op_name: &str) -> Result<&'static dyn OperatorMatcher> {
    OPERATOR_REGISTRY
        .get(op_name)
        .map(|op| op.as_ref())
        .ok_or_else(|| ShelfError::InvalidQuery(format!("Unknown operator: {}", op_name)))
}

fn is_operator_object(obj: &serde_json::Map<String, Value>) -> bool {
    obj.keys().next().map(|k| k.starts_with('$')).unwrap_or(false)
}

// ============================================================================
// VALIDATION
// ============================================================================

fn validate_condition(condition: &serde_json::Map<String, Value>) -> Result<()> {
    for (op_name, op_value) in condition {
        if !op_name.starts_with('$') {
            return Err(ShelfError::InvalidQuery(format!(
                "Cannot mix operators and field names in a condition: {}",
                op_name
            )));
        }
        if op_name == "$options" {
            if !condition.contains_key("$regex") {
                return Err(ShelfError::InvalidQuery(
                    "$options requires $regex".to_string(),
                ));
            }
            if !op_value.is_string() {
                return Err(ShelfError::InvalidQuery(
                    "$options must be a string".to_string(),
                ));
            }
            continue;
        }
        let operator = lookup(op_name)?;
        if operator.is_logical() {
            return Err(ShelfError::InvalidQuery(format!(
                "{} is not allowed inside a field condition",
                op_name
            )));
        }
        operator.validate(op_value)?;
    }
    Ok(())
}

/// Check a filter's structure without evaluating it against any document.
///
/// Rejects unknown operators, wrongly-typed operator arguments and invalid
/// regex patterns, so a malformed filter fails even on an empty collection.
pub fn validate_filter(filter: &Value) -> Result<()> {
    let filter_obj = filter
        .as_object()
        .ok_or_else(|| ShelfError::InvalidQuery("Filter must be an object".to_string()))?;

    for (key, value) in filter_obj {
        if key.starts_with('$') {
            let operator = lookup(key)?;
            if !operator.is_logical() {
                return Err(ShelfError::InvalidQuery(format!(
                    "{} must be applied to a field",
                    key
                )));
            }
            operator.validate(value)?;
        } else if key.is_empty() {
            return Err(ShelfError::InvalidQuery(
                "Filter field names cannot be empty".to_string(),
            ));
        } else if let Value::Object(condition) = value {
            if is_operator_object(condition) {
                validate_condition(condition)?;
            }
        }
    }
    Ok(())
}

// ============================================================================
// MATCHING
// ============================================================================

/// Evaluate an operator object (`{ $gt: 1, $lt: 5 }`) against a field value
fn matches_condition(
    doc_value: Option<&Value>,
    condition: &serde_json::Map<String, Value>,
    document: Option<&Document>,
) -> Result<bool> {
    for (op_name, op_value) in condition {
        match op_name.as_str() {
            "$options" => continue,
            "$regex" => {
                let pattern = op_value.as_str().ok_or_else(|| {
                    ShelfError::InvalidQuery("$regex requires a string pattern".to_string())
                })?;
                let options = condition
                    .get("$options")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if !regex_matches(doc_value, pattern, options)? {
                    return Ok(false);
                }
            }
            _ => {
                if !lookup(op_name)?.matches(doc_value, op_value, document)? {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

/// Main entry point for filter matching.
///
/// Returns `Err` if the filter is malformed.
pub fn matches_filter(document: &Document, filter: &Value) -> Result<bool> {
    let filter_obj = filter
        .as_object()
        .ok_or_else(|| ShelfError::InvalidQuery("Filter must be an object".to_string()))?;

    for (key, value) in filter_obj {
        let matched = if key.starts_with('$') {
            lookup(key)?.matches(None, value, Some(document))?
        } else {
            let doc_value = document.get(key);
            match value {
                Value::Object(condition) if is_operator_object(condition) => {
                    matches_condition(doc_value, condition, Some(document))?
                }
                literal => EqOperator.matches(doc_value, literal, Some(document))?,
            }
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}
