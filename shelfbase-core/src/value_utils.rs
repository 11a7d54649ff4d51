//! Value utility functions shared across modules
//!
//! Field-path access, value comparison and the total ordering used by
//! sort stages and index keys.

use serde_json::Value;
use std::cmp::Ordering;

/// Get nested value from JSON with dot notation support
///
/// Supports:
/// - Simple fields: "title"
/// - Nested objects: "publisher.city"
/// - Array indexing: "editions.0.year"
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use shelfbase_core::value_utils::get_nested_value;
///
/// let doc = json!({"publisher": {"city": "London"}});
/// assert_eq!(get_nested_value(&doc, "publisher.city"), Some(&json!("London")));
/// ```
pub fn get_nested_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    if !path.contains('.') {
        return doc.get(path);
    }

    let mut value = doc;
    for part in path.split('.') {
        match value {
            Value::Object(map) => value = map.get(part)?,
            Value::Array(arr) => {
                let index = part.parse::<usize>().ok()?;
                value = arr.get(index)?;
            }
            _ => return None,
        }
    }
    Some(value)
}

/// Set a value at a nested path, creating intermediate objects.
///
/// Non-object intermediates are replaced by objects.
///
/// ```
/// use serde_json::json;
/// use shelfbase_core::value_utils::set_nested_value;
///
/// let mut doc = json!({"title": "Dune"});
/// set_nested_value(&mut doc, "publisher.city", json!("Philadelphia"));
/// assert_eq!(doc["publisher"]["city"], "Philadelphia");
/// ```
pub fn set_nested_value(doc: &mut Value, path: &str, value: Value) {
    let mut current = doc;
    let mut parts = path.split('.').peekable();

    while let Some(part) = parts.next() {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };

        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }

        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}

/// Remove the value at a nested path, returning it if present
pub fn remove_nested_value(doc: &mut Value, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => doc.as_object_mut()?.remove(path),
        Some((parent, leaf)) => {
            let mut current = doc;
            for part in parent.split('.') {
                current = current.as_object_mut()?.get_mut(part)?;
            }
            current.as_object_mut()?.remove(leaf)
        }
    }
}

/// Compare two JSON values
///
/// Returns `Some(Ordering)` for comparable types (numbers, strings, booleans),
/// `None` for incompatible types. Query operators treat `None` as "no match".
///
/// ```
/// use serde_json::json;
/// use std::cmp::Ordering;
/// use shelfbase_core::value_utils::compare_values;
///
/// assert_eq!(compare_values(&json!(10), &json!(5)), Some(Ordering::Greater));
/// assert_eq!(compare_values(&json!("a"), &json!("b")), Some(Ordering::Less));
/// assert_eq!(compare_values(&json!("a"), &json!(1)), None);
/// ```
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => {
            let f1 = n1.as_f64()?;
            let f2 = n2.as_f64()?;
            f1.partial_cmp(&f2)
        }
        (Value::String(s1), Value::String(s2)) => Some(s1.cmp(s2)),
        (Value::Bool(b1), Value::Bool(b2)) => Some(b1.cmp(b2)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Type priority for mixed-type ordering: null < number < string < bool < object < array
fn type_priority(val: &Value) -> u8 {
    match val {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Bool(_) => 3,
        Value::Object(_) => 4,
        Value::Array(_) => 5,
    }
}

/// Total order over optional values, used by sort stages and index keys.
///
/// A missing value sorts like null. Values of different types order by
/// type priority; objects and arrays of the same type compare by their
/// canonical text.
pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);

    if let Some(ordering) = compare_values(a, b) {
        return ordering;
    }

    match type_priority(a).cmp(&type_priority(b)) {
        Ordering::Equal => canonical_json_string(a).cmp(&canonical_json_string(b)),
        other => other,
    }
}

/// Canonical string form of a value with object keys sorted.
///
/// Two logically equal values always produce the same string, which makes
/// it usable as a grouping key.
///
/// ```
/// use serde_json::json;
/// use shelfbase_core::value_utils::canonical_json_string;
///
/// let v1 = json!({"a": 1, "b": 2});
/// let v2 = json!({"b": 2, "a": 1});
/// assert_eq!(canonical_json_string(&v1), canonical_json_string(&v2));
/// ```
pub fn canonical_json_string(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));

            let inner = pairs
                .iter()
                .map(|(k, v)| format!("{:?}:{}", k, canonical_json_string(v)))
                .collect::<Vec<_>>()
                .join(",");

            format!("{{{}}}", inner)
        }
        Value::Array(arr) => {
            let inner = arr
                .iter()
                .map(canonical_json_string)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{}]", inner)
        }
        _ => value.to_string(),
    }
}

/// Numeric view of a value, if it is a JSON number
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_nested_value_simple() {
        let doc = json!({"title": "1984", "published_year": 1949});
        assert_eq!(get_nested_value(&doc, "title"), Some(&json!("1984")));
        assert_eq!(get_nested_value(&doc, "published_year"), Some(&json!(1949)));
        assert_eq!(get_nested_value(&doc, "missing"), None);
    }

    #[test]
    fn test_get_nested_value_nested_and_array() {
        let doc = json!({
            "publisher": {"name": "Secker & Warburg"},
            "editions": [{"year": 1949}, {"year": 1961}]
        });
        assert_eq!(
            get_nested_value(&doc, "publisher.name"),
            Some(&json!("Secker & Warburg"))
        );
        assert_eq!(get_nested_value(&doc, "editions.1.year"), Some(&json!(1961)));
        assert_eq!(get_nested_value(&doc, "editions.7.year"), None);
        assert_eq!(get_nested_value(&doc, "editions.first"), None);
    }

    #[test]
    fn test_set_nested_value_creates_path() {
        let mut doc = json!({"title": "Dune"});
        set_nested_value(&mut doc, "stats.copies.sold", json!(12));
        assert_eq!(doc["stats"]["copies"]["sold"], 12);

        set_nested_value(&mut doc, "title", json!("Dune Messiah"));
        assert_eq!(doc["title"], "Dune Messiah");
    }

    #[test]
    fn test_set_nested_value_replaces_scalar_intermediate() {
        let mut doc = json!({"stats": 5});
        set_nested_value(&mut doc, "stats.sold", json!(1));
        assert_eq!(doc["stats"], json!({"sold": 1}));
    }

    #[test]
    fn test_remove_nested_value() {
        let mut doc = json!({"price": 9.99, "stats": {"sold": 3, "returned": 1}});
        assert_eq!(remove_nested_value(&mut doc, "price"), Some(json!(9.99)));
        assert_eq!(remove_nested_value(&mut doc, "stats.sold"), Some(json!(3)));
        assert_eq!(remove_nested_value(&mut doc, "stats.missing"), None);
        assert_eq!(doc, json!({"stats": {"returned": 1}}));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(10), &json!(5.5)), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!("a"), &json!("a")), Some(Ordering::Equal));
        assert_eq!(compare_values(&json!(false), &json!(true)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!("1"), &json!(1)), None);
        assert_eq!(compare_values(&json!(true), &json!(1)), None);
    }

    #[test]
    fn test_sort_order_mixed_types() {
        assert_eq!(sort_order(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(sort_order(None, Some(&Value::Null)), Ordering::Equal);
        assert_eq!(sort_order(Some(&json!(99)), Some(&json!("0"))), Ordering::Less);
        assert_eq!(sort_order(Some(&json!("z")), Some(&json!(true))), Ordering::Less);
        assert_eq!(
            sort_order(Some(&json!([1])), Some(&json!([2]))),
            Ordering::Less
        );
    }

    #[test]
    fn test_canonical_json_string_key_order() {
        let v1 = json!({"x": {"b": 2, "a": 1}, "list": [{"d": 1, "c": 2}]});
        let v2 = json!({"list": [{"c": 2, "d": 1}], "x": {"a": 1, "b": 2}});
        assert_eq!(canonical_json_string(&v1), canonical_json_string(&v2));
        assert_eq!(canonical_json_string(&json!("s")), "\"s\"");
        assert_eq!(canonical_json_string(&json!({})), "{}");
    }

    #[test]
    fn test_as_number() {
        assert_eq!(as_number(&json!(3)), Some(3.0));
        assert_eq!(as_number(&json!(2.5)), Some(2.5));
        assert_eq!(as_number(&json!("3")), None);
    }
}
