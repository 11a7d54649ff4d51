// collection_core/update.rs
// Update operators: $set, $unset, $inc

use crate::document::Document;
use crate::error::{Result, ShelfError};
use serde_json::Value;

const UPDATE_OPERATORS: &[&str] = &["$set", "$unset", "$inc"];

fn rejected(msg: impl Into<String>) -> ShelfError {
    ShelfError::WriteRejected(msg.into())
}

/// Structural checks done before any document is touched
pub fn validate_update(update: &Value) -> Result<()> {
    let Value::Object(ops) = update else {
        return Err(rejected("Update must be an object"));
    };
    if ops.is_empty() {
        return Err(rejected("Update document cannot be empty"));
    }

    let mut touched: Vec<&str> = Vec::new();
    for (op, fields) in ops {
        if !UPDATE_OPERATORS.contains(&op.as_str()) {
            return Err(if op.starts_with('$') {
                rejected(format!("Unknown update operator: {}", op))
            } else {
                rejected("Update document requires update operators ($set, $unset, $inc)")
            });
        }

        let Value::Object(field_values) = fields else {
            return Err(rejected(format!("{} requires an object of fields", op)));
        };
        if field_values.is_empty() {
            return Err(rejected(format!("{} requires at least one field", op)));
        }

        for (field, value) in field_values {
            if field.is_empty() || field.split('.').any(|p| p.is_empty()) {
                return Err(rejected(format!("Invalid field path '{}'", field)));
            }
            if field == "_id" || field.starts_with("_id.") {
                return Err(rejected("the _id field is immutable"));
            }
            if op == "$inc" && !value.is_number() {
                return Err(rejected(format!("$inc value for '{}' must be a number", field)));
            }
            if touched.iter().any(|t| paths_conflict(t, field)) {
                return Err(rejected(format!(
                    "Updating the path '{}' would create a conflict",
                    field
                )));
            }
            touched.push(field);
        }
    }
    Ok(())
}

fn paths_conflict(a: &str, b: &str) -> bool {
    a == b
        || a.strip_prefix(b).map_or(false, |rest| rest.starts_with('.'))
        || b.strip_prefix(a).map_or(false, |rest| rest.starts_with('.'))
}

/// Apply a validated update; returns whether the document changed
pub fn apply_update(document: &mut Document, update: &Value) -> Result<bool> {
    validate_update(update)?;
    let Value::Object(ops) = update else {
        return Ok(false);
    };

    let mut was_modified = false;
    for (op, fields) in ops {
        let Value::Object(field_values) = fields else {
            continue;
        };
        for (field, value) in field_values {
            let changed = match op.as_str() {
                "$set" => {
                    if document.get(field) == Some(value) {
                        false
                    } else {
                        document.set(field, value.clone())?;
                        true
                    }
                }
                "$unset" => document.remove(field)?.is_some(),
                "$inc" => apply_inc(document, field, value)?,
                _ => false,
            };
            was_modified |= changed;
        }
    }
    Ok(was_modified)
}

fn apply_inc(document: &mut Document, field: &str, inc: &Value) -> Result<bool> {
    let next = match document.get(field) {
        None => inc.clone(),
        Some(current) => {
            // Keep integers integral while both sides are integers
            if let (Some(a), Some(b)) = (current.as_i64(), inc.as_i64()) {
                Value::from(a.checked_add(b).ok_or_else(|| {
                    rejected(format!("$inc on '{}' overflows a 64-bit integer", field))
                })?)
            } else if let (Some(a), Some(b)) = (current.as_f64(), inc.as_f64()) {
                Value::from(a + b)
            } else {
                return Err(rejected(format!(
                    "Cannot apply $inc to non-numeric field '{}'",
                    field
                )));
            }
        }
    };

    if document.get(field) == Some(&next) {
        return Ok(false);
    }
    document.set(field, next)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn book() -> Document {
        Document::from_value(json!({"_id": 1, "title": "1984", "price": 10.5, "stock": 3})).unwrap()
    }

    #[test]
    fn test_set_reports_change_once() {
        let mut doc = book();
        assert!(apply_update(&mut doc, &json!({"$set": {"price": 12.99}})).unwrap());
        assert_eq!(doc.get("price"), Some(&json!(12.99)));
        assert!(!apply_update(&mut doc, &json!({"$set": {"price": 12.99}})).unwrap());
    }

    #[test]
    fn test_set_nested_creates_path() {
        let mut doc = book();
        assert!(apply_update(&mut doc, &json!({"$set": {"publisher.city": "London"}})).unwrap());
        assert_eq!(doc.get("publisher.city"), Some(&json!("London")));
    }

    #[test]
    fn test_unset() {
        let mut doc = book();
        assert!(apply_update(&mut doc, &json!({"$unset": {"stock": ""}})).unwrap());
        assert!(!doc.contains("stock"));
        assert!(!apply_update(&mut doc, &json!({"$unset": {"stock": ""}})).unwrap());
    }

    #[test]
    fn test_inc() {
        let mut doc = book();
        assert!(apply_update(&mut doc, &json!({"$inc": {"stock": 2, "sold": 1}})).unwrap());
        assert_eq!(doc.get("stock"), Some(&json!(5)));
        assert_eq!(doc.get("sold"), Some(&json!(1)));

        assert!(apply_update(&mut doc, &json!({"$inc": {"price": 1}})).unwrap());
        assert_eq!(doc.get("price"), Some(&json!(11.5)));

        assert!(apply_update(&mut doc, &json!({"$inc": {"title": 1}})).is_err());
    }

    #[test]
    fn test_validate_update_rejections() {
        for update in [
            json!({}),
            json!("price"),
            json!({"price": 12.99}),
            json!({"$push": {"tags": "x"}}),
            json!({"$set": {}}),
            json!({"$set": {"_id": 5}}),
            json!({"$inc": {"price": "1"}}),
            json!({"$set": {"a": 1}, "$unset": {"a": ""}}),
            json!({"$set": {"a": 1, "a.b": 2}}),
            json!({"$set": {"a..b": 1}}),
        ] {
            let result = validate_update(&update);
            assert!(
                matches!(result, Err(ShelfError::WriteRejected(_))),
                "expected rejection for {}",
                update
            );
        }
        assert!(validate_update(&json!({"$set": {"ab": 1, "a": 2}})).is_ok());
    }
}
