// src/query_planner.rs
// Index selection for find, aggregate and explain

use crate::index::{CollectionIndex, IndexKey, KeyBounds};
use serde_json::{json, Value};
use std::ops::Bound;

/// Chosen access path for a filter
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    /// Examine every document in natural order
    CollectionScan,
    /// Scan the index for candidates, then re-check the full filter
    IndexScan {
        index_name: String,
        key_pattern: Value,
        bounds: KeyBounds,
    },
}

impl QueryPlan {
    /// Stage name as reported by explain
    pub fn stage(&self) -> &'static str {
        match self {
            QueryPlan::CollectionScan => "COLLSCAN",
            QueryPlan::IndexScan { .. } => "IXSCAN",
        }
    }

    pub fn index_name(&self) -> Option<&str> {
        match self {
            QueryPlan::CollectionScan => None,
            QueryPlan::IndexScan { index_name, .. } => Some(index_name),
        }
    }

    /// `winningPlan` document
    pub fn to_json(&self) -> Value {
        match self {
            QueryPlan::CollectionScan => json!({ "stage": "COLLSCAN" }),
            QueryPlan::IndexScan {
                index_name,
                key_pattern,
                ..
            } => json!({
                "stage": "IXSCAN",
                "indexName": index_name,
                "keyPattern": key_pattern,
            }),
        }
    }
}

pub struct QueryPlanner;

impl QueryPlanner {
    /// Pick the first index (in creation order) whose leading field is
    /// constrained by the filter. Equality bounds win over range bounds.
    pub fn plan(filter: &Value, indexes: &[CollectionIndex]) -> QueryPlan {
        let mut range_plan: Option<QueryPlan> = None;

        for index in indexes {
            let field = index.model().leading_field();
            let Some(bounds) = Self::bounds_for_field(filter, field) else {
                continue;
            };
            let plan = QueryPlan::IndexScan {
                index_name: index.name().to_string(),
                key_pattern: index.model().key_pattern(),
                bounds,
            };
            match plan {
                QueryPlan::IndexScan {
                    bounds: KeyBounds::Points(_),
                    ..
                } => return plan,
                _ => {
                    if range_plan.is_none() {
                        range_plan = Some(plan);
                    }
                }
            }
        }

        range_plan.unwrap_or(QueryPlan::CollectionScan)
    }

    /// Bounds on `field` implied by the filter's top-level (or `$and`) clauses
    pub fn bounds_for_field(filter: &Value, field: &str) -> Option<KeyBounds> {
        let conditions = field_conditions(filter, field);

        let mut points: Option<Vec<IndexKey>> = None;
        let mut lower: Bound<IndexKey> = Bound::Unbounded;
        let mut upper: Bound<IndexKey> = Bound::Unbounded;
        let mut has_range = false;

        for condition in conditions {
            match condition {
                Value::Object(ops) if ops.keys().next().map_or(false, |k| k.starts_with('$')) => {
                    for (op, arg) in ops {
                        if !is_scalar(arg) && op != "$in" {
                            continue;
                        }
                        match op.as_str() {
                            "$eq" => points = Some(vec![IndexKey::from(arg)]),
                            "$in" => {
                                if let Some(items) = arg.as_array() {
                                    if items.iter().all(is_scalar) && points.is_none() {
                                        points = Some(items.iter().map(IndexKey::from).collect());
                                    }
                                }
                            }
                            "$gt" => {
                                lower = tighter_lower(lower, Bound::Excluded(IndexKey::from(arg)));
                                has_range = true;
                            }
                            "$gte" => {
                                lower = tighter_lower(lower, Bound::Included(IndexKey::from(arg)));
                                has_range = true;
                            }
                            "$lt" => {
                                upper = tighter_upper(upper, Bound::Excluded(IndexKey::from(arg)));
                                has_range = true;
                            }
                            "$lte" => {
                                upper = tighter_upper(upper, Bound::Included(IndexKey::from(arg)));
                                has_range = true;
                            }
                            _ => {}
                        }
                    }
                }
                literal if is_scalar(literal) => points = Some(vec![IndexKey::from(literal)]),
                _ => {}
            }
        }

        match points {
            Some(points) => Some(KeyBounds::Points(points)),
            None if has_range => Some(KeyBounds::Range { lower, upper }),
            None => None,
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn field_conditions<'a>(filter: &'a Value, field: &str) -> Vec<&'a Value> {
    let mut out = Vec::new();
    let Value::Object(map) = filter else {
        return out;
    };
    if let Some(condition) = map.get(field) {
        out.push(condition);
    }
    if let Some(Value::Array(clauses)) = map.get("$and") {
        for clause in clauses {
            out.extend(field_conditions(clause, field));
        }
    }
    out
}

fn bound_key(bound: &Bound<IndexKey>) -> Option<&IndexKey> {
    match bound {
        Bound::Included(k) | Bound::Excluded(k) => Some(k),
        Bound::Unbounded => None,
    }
}

fn tighter_lower(current: Bound<IndexKey>, candidate: Bound<IndexKey>) -> Bound<IndexKey> {
    match (bound_key(&current), bound_key(&candidate)) {
        (None, _) => candidate,
        (Some(a), Some(b)) if b > a => candidate,
        (Some(a), Some(b)) if a == b && matches!(candidate, Bound::Excluded(_)) => candidate,
        _ => current,
    }
}

fn tighter_upper(current: Bound<IndexKey>, candidate: Bound<IndexKey>) -> Bound<IndexKey> {
    match (bound_key(&current), bound_key(&candidate)) {
        (None, _) => candidate,
        (Some(a), Some(b)) if b < a => candidate,
        (Some(a), Some(b)) if a == b && matches!(candidate, Bound::Excluded(_)) => candidate,
        _ => current,
    }
}
