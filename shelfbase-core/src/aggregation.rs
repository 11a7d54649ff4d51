// src/aggregation.rs
// Aggregation pipeline implementation

use crate::document::Document;
use crate::error::{Result, ShelfError};
use crate::find_options::{apply_sort, SortDirection};
use crate::query::Query;
use crate::value_utils::{as_number, canonical_json_string, get_nested_value, set_nested_value};
use ahash::AHashMap;
use serde_json::Value;

fn agg_error(msg: impl Into<String>) -> ShelfError {
    ShelfError::AggregationError(msg.into())
}

/// JSON number from an f64, kept integral when it has no fractional part
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

/// Aggregation expression: `"$field"`, a literal, `{ $op: [args] }` or a
/// document of sub-expressions (`{ author: "$author", year: "$published_year" }`)
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Field(String),
    Operator(ExprOp, Vec<Expression>),
    Object(Vec<(String, Expression)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Floor,
    Concat,
    ToString,
    IfNull,
}

impl ExprOp {
    fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "$add" => ExprOp::Add,
            "$subtract" => ExprOp::Subtract,
            "$multiply" => ExprOp::Multiply,
            "$divide" => ExprOp::Divide,
            "$floor" => ExprOp::Floor,
            "$concat" => ExprOp::Concat,
            "$toString" => ExprOp::ToString,
            "$ifNull" => ExprOp::IfNull,
            _ => return Err(agg_error(format!("Unknown expression operator: {}", name))),
        })
    }

    /// Allowed argument count (min, max)
    fn arity(self) -> (usize, usize) {
        match self {
            ExprOp::Add | ExprOp::Multiply | ExprOp::Concat => (1, usize::MAX),
            ExprOp::Subtract | ExprOp::Divide | ExprOp::IfNull => (2, 2),
            ExprOp::Floor | ExprOp::ToString => (1, 1),
        }
    }
}

impl Expression {
    pub fn from_json(spec: &Value) -> Result<Self> {
        match spec {
            Value::String(s) if s.starts_with('$') => {
                let field = s.trim_start_matches('$');
                if field.is_empty() {
                    return Err(agg_error("Field reference cannot be empty"));
                }
                Ok(Expression::Field(field.to_string()))
            }
            Value::Object(obj) if obj.len() == 1 && obj.keys().all(|k| k.starts_with('$')) => {
                let (op_name, args) = obj
                    .iter()
                    .next()
                    .ok_or_else(|| agg_error("Expression object cannot be empty"))?;

                if op_name == "$literal" {
                    return Ok(Expression::Literal(args.clone()));
                }

                let op = ExprOp::parse(op_name)?;
                let args = match args {
                    Value::Array(items) => items
                        .iter()
                        .map(Expression::from_json)
                        .collect::<Result<Vec<_>>>()?,
                    single => vec![Expression::from_json(single)?],
                };

                let (min, max) = op.arity();
                if args.len() < min || args.len() > max {
                    return Err(agg_error(format!(
                        "{} received {} argument(s)",
                        op_name,
                        args.len()
                    )));
                }
                Ok(Expression::Operator(op, args))
            }
            Value::Object(obj) => {
                if obj.keys().any(|k| k.starts_with('$')) {
                    return Err(agg_error(
                        "Expression objects take exactly one operator and no field names",
                    ));
                }
                let fields = obj
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), Expression::from_json(v)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expression::Object(fields))
            }
            literal => Ok(Expression::Literal(literal.clone())),
        }
    }

    /// Evaluate against a document. Missing fields evaluate to null.
    pub fn evaluate(&self, doc: &Value) -> Result<Value> {
        match self {
            Expression::Literal(v) => Ok(v.clone()),
            Expression::Field(path) => {
                Ok(get_nested_value(doc, path).cloned().unwrap_or(Value::Null))
            }
            Expression::Object(fields) => {
                let mut out = serde_json::Map::new();
                for (name, expr) in fields {
                    out.insert(name.clone(), expr.evaluate(doc)?);
                }
                Ok(Value::Object(out))
            }
            Expression::Operator(op, args) => {
                let values = args
                    .iter()
                    .map(|a| a.evaluate(doc))
                    .collect::<Result<Vec<_>>>()?;
                apply_operator(*op, values)
            }
        }
    }
}

fn numeric_args(op: &str, values: &[Value]) -> Result<Option<Vec<f64>>> {
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        match v {
            Value::Null => return Ok(None),
            other => out.push(
                as_number(other)
                    .ok_or_else(|| {
                        agg_error(format!("{} only supports numeric types, got {}", op, other))
                    })?,
            ),
        }
    }
    Ok(Some(out))
}

fn apply_operator(op: ExprOp, values: Vec<Value>) -> Result<Value> {
    match op {
        ExprOp::Add => Ok(numeric_args("$add", &values)?
            .map(|nums| number_value(nums.iter().sum()))
            .unwrap_or(Value::Null)),
        ExprOp::Multiply => Ok(numeric_args("$multiply", &values)?
            .map(|nums| number_value(nums.iter().product()))
            .unwrap_or(Value::Null)),
        ExprOp::Subtract => Ok(numeric_args("$subtract", &values)?
            .map(|nums| number_value(nums[0] - nums[1]))
            .unwrap_or(Value::Null)),
        ExprOp::Divide => match numeric_args("$divide", &values)? {
            Some(nums) if nums[1] == 0.0 => Err(agg_error("$divide by zero")),
            Some(nums) => Ok(number_value(nums[0] / nums[1])),
            None => Ok(Value::Null),
        },
        ExprOp::Floor => Ok(numeric_args("$floor", &values)?
            .map(|nums| number_value(nums[0].floor()))
            .unwrap_or(Value::Null)),
        ExprOp::ToString => Ok(match &values[0] {
            Value::Null => Value::Null,
            Value::String(s) => Value::String(s.clone()),
            Value::Number(n) => Value::String(match as_number(&values[0]) {
                Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("{}", f as i64),
                _ => n.to_string(),
            }),
            Value::Bool(b) => Value::String(b.to_string()),
            other => return Err(agg_error(format!("$toString cannot convert {}", other))),
        }),
        ExprOp::Concat => {
            let mut out = String::new();
            for v in &values {
                match v {
                    Value::Null => return Ok(Value::Null),
                    Value::String(s) => out.push_str(s),
                    other => {
                        return Err(agg_error(format!(
                            "$concat only supports strings, got {}",
                            other
                        )))
                    }
                }
            }
            Ok(Value::String(out))
        }
        ExprOp::IfNull => Ok(if values[0].is_null() {
            values[1].clone()
        } else {
            values[0].clone()
        }),
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Aggregation pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

/// Pipeline stage
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Query),
    Project(ProjectStage),
    Group(GroupStage),
    Sort(Vec<(String, SortDirection)>),
    Limit(usize),
    Skip(usize),
    Count(String),
}

/// $project stage - reshape documents
#[derive(Debug, Clone)]
pub struct ProjectStage {
    fields: Vec<(String, ProjectField)>,
    include_mode: bool,
}

#[derive(Debug, Clone)]
pub enum ProjectField {
    Include,
    Exclude,
    Computed(Expression),
}

/// $group stage - group documents and compute aggregates
#[derive(Debug, Clone)]
pub struct GroupStage {
    id: Expression,
    accumulators: Vec<(String, Accumulator)>,
}

#[derive(Debug, Clone)]
pub enum Accumulator {
    Sum(Expression),
    Avg(Expression),
    Min(Expression),
    Max(Expression),
    First(Expression),
    Last(Expression),
    Count,
}

impl Pipeline {
    /// Create pipeline from JSON array
    pub fn from_json(pipeline_json: &Value) -> Result<Self> {
        let Value::Array(stages_array) = pipeline_json else {
            return Err(agg_error("Pipeline must be an array"));
        };
        if stages_array.is_empty() {
            return Err(agg_error("Pipeline cannot be empty"));
        }

        let stages = stages_array
            .iter()
            .map(Stage::from_json)
            .collect::<Result<Vec<_>>>()?;
        Ok(Pipeline { stages })
    }

    /// Leading `$match` filter, if any (used for index selection)
    pub fn leading_match(&self) -> Option<&Query> {
        match self.stages.first() {
            Some(Stage::Match(query)) => Some(query),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Execute pipeline on documents
    pub fn execute(&self, mut docs: Vec<Value>) -> Result<Vec<Value>> {
        for stage in &self.stages {
            docs = stage.execute(docs)?;
        }
        Ok(docs)
    }
}

fn parse_count(name: &str, spec: &Value) -> Result<usize> {
    spec.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| agg_error(format!("{} must be a non-negative integer", name)))
}

impl Stage {
    fn from_json(stage_json: &Value) -> Result<Self> {
        let Value::Object(obj) = stage_json else {
            return Err(agg_error("Stage must be an object"));
        };
        if obj.len() != 1 {
            return Err(agg_error("Each stage must have exactly one operator"));
        }
        let (stage_name, spec) = obj
            .iter()
            .next()
            .ok_or_else(|| agg_error("Each stage must have exactly one operator"))?;

        match stage_name.as_str() {
            "$match" => Ok(Stage::Match(Query::from_json(spec)?)),
            "$project" => Ok(Stage::Project(ProjectStage::from_json(spec)?)),
            "$group" => Ok(Stage::Group(GroupStage::from_json(spec)?)),
            "$sort" => Ok(Stage::Sort(parse_sort_spec(spec)?)),
            "$limit" => Ok(Stage::Limit(parse_count("$limit", spec)?)),
            "$skip" => Ok(Stage::Skip(parse_count("$skip", spec)?)),
            "$count" => match spec.as_str() {
                Some(name) if !name.is_empty() && !name.starts_with('$') => {
                    Ok(Stage::Count(name.to_string()))
                }
                _ => Err(agg_error("$count requires a non-empty field name")),
            },
            _ => Err(agg_error(format!("Unknown pipeline stage: {}", stage_name))),
        }
    }

    fn execute(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        match self {
            Stage::Match(query) => {
                let mut results = Vec::with_capacity(docs.len());
                for doc in docs {
                    if match_value(query, &doc)? {
                        results.push(doc);
                    }
                }
                Ok(results)
            }
            Stage::Project(stage) => docs.iter().map(|d| stage.project_document(d)).collect(),
            Stage::Group(stage) => stage.execute(docs),
            Stage::Sort(keys) => {
                let mut docs = docs;
                apply_sort(&mut docs, keys);
                Ok(docs)
            }
            Stage::Limit(n) => Ok(docs.into_iter().take(*n).collect()),
            Stage::Skip(n) => Ok(docs.into_iter().skip(*n).collect()),
            Stage::Count(name) => {
                if docs.is_empty() {
                    return Ok(Vec::new());
                }
                let mut out = serde_json::Map::new();
                out.insert(name.clone(), Value::from(docs.len() as u64));
                Ok(vec![Value::Object(out)])
            }
        }
    }
}

/// Intermediate results (e.g. group output) may carry any `_id`, or none
fn match_value(query: &Query, doc: &Value) -> Result<bool> {
    query.matches(&Document::from_pipeline_value(doc.clone()))
}

fn parse_sort_spec(spec: &Value) -> Result<Vec<(String, SortDirection)>> {
    let Value::Object(obj) = spec else {
        return Err(agg_error("$sort must be an object"));
    };
    if obj.is_empty() {
        return Err(agg_error("$sort requires at least one field"));
    }
    obj.iter()
        .map(|(field, value)| {
            let n = value
                .as_i64()
                .ok_or_else(|| agg_error("Sort direction must be 1 or -1"))?;
            let direction = SortDirection::from_i64(n)
                .map_err(|_| agg_error("Sort direction must be 1 or -1"))?;
            Ok((field.clone(), direction))
        })
        .collect()
}

impl ProjectStage {
    fn from_json(spec: &Value) -> Result<Self> {
        let Value::Object(obj) = spec else {
            return Err(agg_error("$project must be an object"));
        };
        if obj.is_empty() {
            return Err(agg_error("$project requires at least one field"));
        }

        let mut fields = Vec::with_capacity(obj.len());
        for (field, value) in obj {
            let project_field = match value {
                Value::Bool(true) => ProjectField::Include,
                Value::Bool(false) => ProjectField::Exclude,
                Value::Number(n) => match n.as_i64() {
                    Some(1) => ProjectField::Include,
                    Some(0) => ProjectField::Exclude,
                    _ => return Err(agg_error(format!("Invalid project value: {}", n))),
                },
                Value::String(s) if !s.starts_with('$') => {
                    return Err(agg_error(format!("Invalid project expression: {}", s)))
                }
                other => ProjectField::Computed(Expression::from_json(other)?),
            };
            fields.push((field.clone(), project_field));
        }

        let has_inclusions = fields
            .iter()
            .any(|(_, f)| !matches!(f, ProjectField::Exclude));
        let has_non_id_exclusions = fields
            .iter()
            .any(|(name, f)| matches!(f, ProjectField::Exclude) && name != "_id");
        if has_inclusions && has_non_id_exclusions {
            return Err(agg_error("$project cannot mix inclusion and exclusion"));
        }

        Ok(ProjectStage {
            fields,
            include_mode: has_inclusions,
        })
    }

    fn project_document(&self, doc: &Value) -> Result<Value> {
        let Value::Object(obj) = doc else {
            return Ok(doc.clone());
        };

        if !self.include_mode {
            let mut result = obj.clone();
            for (name, _) in &self.fields {
                result.remove(name);
            }
            return Ok(Value::Object(result));
        }

        let mut result = Value::Object(serde_json::Map::new());
        let id_excluded = self
            .fields
            .iter()
            .any(|(name, f)| name == "_id" && matches!(f, ProjectField::Exclude));
        if !id_excluded {
            if let Some(id) = obj.get("_id") {
                set_nested_value(&mut result, "_id", id.clone());
            }
        }

        for (name, field) in &self.fields {
            match field {
                ProjectField::Include => {
                    if let Some(value) = get_nested_value(doc, name) {
                        set_nested_value(&mut result, name, value.clone());
                    }
                }
                ProjectField::Computed(expr) => {
                    set_nested_value(&mut result, name, expr.evaluate(doc)?);
                }
                ProjectField::Exclude => {}
            }
        }
        Ok(result)
    }
}

impl GroupStage {
    fn from_json(spec: &Value) -> Result<Self> {
        let Value::Object(obj) = spec else {
            return Err(agg_error("$group must be an object"));
        };
        let id_spec = obj
            .get("_id")
            .ok_or_else(|| agg_error("Group stage must have _id field"))?;
        if let Value::String(s) = id_spec {
            if !s.starts_with('$') {
                return Err(agg_error("Group _id field reference must start with $"));
            }
        }
        let id = Expression::from_json(id_spec)?;

        let mut accumulators = Vec::new();
        for (field, value) in obj {
            if field == "_id" {
                continue;
            }
            accumulators.push((field.clone(), Accumulator::from_json(value)?));
        }

        Ok(GroupStage { id, accumulators })
    }

    /// Groups are emitted in first-encountered order
    fn execute(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        let mut positions: AHashMap<String, usize> = AHashMap::new();
        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();

        for doc in docs {
            let key = self.id.evaluate(&doc)?;
            let canonical = canonical_json_string(&key);
            match positions.get(&canonical) {
                Some(&pos) => groups[pos].1.push(doc),
                None => {
                    positions.insert(canonical, groups.len());
                    groups.push((key, vec![doc]));
                }
            }
        }

        let mut results = Vec::with_capacity(groups.len());
        for (key, members) in groups {
            let mut result = serde_json::Map::new();
            result.insert("_id".to_string(), key);
            for (field, accumulator) in &self.accumulators {
                result.insert(field.clone(), accumulator.compute(&members)?);
            }
            results.push(Value::Object(result));
        }
        Ok(results)
    }
}

impl Accumulator {
    fn from_json(spec: &Value) -> Result<Self> {
        let Value::Object(obj) = spec else {
            return Err(agg_error("Accumulator must be an object"));
        };
        if obj.len() != 1 {
            return Err(agg_error("Accumulator must have exactly one operator"));
        }
        let (op, value) = obj
            .iter()
            .next()
            .ok_or_else(|| agg_error("Accumulator must have exactly one operator"))?;

        let expr = || Expression::from_json(value);
        match op.as_str() {
            "$sum" => Ok(Accumulator::Sum(expr()?)),
            "$avg" => Ok(Accumulator::Avg(expr()?)),
            "$min" => Ok(Accumulator::Min(expr()?)),
            "$max" => Ok(Accumulator::Max(expr()?)),
            "$first" => Ok(Accumulator::First(expr()?)),
            "$last" => Ok(Accumulator::Last(expr()?)),
            "$count" => Ok(Accumulator::Count),
            _ => Err(agg_error(format!("Unknown accumulator: {}", op))),
        }
    }

    fn numbers(expr: &Expression, docs: &[Value]) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            if let Some(n) = as_number(&expr.evaluate(doc)?) {
                out.push(n);
            }
        }
        Ok(out)
    }

    fn compute(&self, docs: &[Value]) -> Result<Value> {
        match self {
            Accumulator::Count => Ok(Value::from(docs.len() as u64)),
            // Non-numeric values are ignored by $sum, $avg, $min and $max
            Accumulator::Sum(expr) => {
                let total: f64 = Self::numbers(expr, docs)?.iter().sum();
                Ok(number_value(total))
            }
            Accumulator::Avg(expr) => {
                let nums = Self::numbers(expr, docs)?;
                if nums.is_empty() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::from(nums.iter().sum::<f64>() / nums.len() as f64))
                }
            }
            Accumulator::Min(expr) => Ok(Self::numbers(expr, docs)?
                .into_iter()
                .reduce(f64::min)
                .map(number_value)
                .unwrap_or(Value::Null)),
            Accumulator::Max(expr) => Ok(Self::numbers(expr, docs)?
                .into_iter()
                .reduce(f64::max)
                .map(number_value)
                .unwrap_or(Value::Null)),
            Accumulator::First(expr) => match docs.first() {
                Some(doc) => expr.evaluate(doc),
                None => Ok(Value::Null),
            },
            Accumulator::Last(expr) => match docs.last() {
                Some(doc) => expr.evaluate(doc),
                None => Ok(Value::Null),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(pipeline: Value, docs: Vec<Value>) -> Vec<Value> {
        Pipeline::from_json(&pipeline).unwrap().execute(docs).unwrap()
    }

    // ========== Pipeline parsing ==========

    #[test]
    fn test_pipeline_not_array() {
        let result = Pipeline::from_json(&json!({"$match": {}}));
        assert!(result.unwrap_err().to_string().contains("must be an array"));
    }

    #[test]
    fn test_pipeline_empty() {
        let result = Pipeline::from_json(&json!([]));
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_stage_errors() {
        let multiple = Pipeline::from_json(&json!([{"$match": {}, "$sort": {"a": 1}}]));
        assert!(multiple.unwrap_err().to_string().contains("exactly one operator"));

        let unknown = Pipeline::from_json(&json!([{"$unwind": "$tags"}]));
        assert!(unknown.unwrap_err().to_string().contains("Unknown pipeline stage"));

        let bad_sort = Pipeline::from_json(&json!([{"$sort": {"price": 2}}]));
        assert!(bad_sort.unwrap_err().to_string().contains("1 or -1"));

        let bad_limit = Pipeline::from_json(&json!([{"$limit": -1}]));
        assert!(bad_limit.is_err());

        let bad_match = Pipeline::from_json(&json!([{"$match": {"price": {"$in": 3}}}]));
        assert!(matches!(bad_match, Err(ShelfError::InvalidQuery(_))));
    }

    #[test]
    fn test_leading_match() {
        let pipeline = Pipeline::from_json(&json!([
            {"$match": {"genre": "Fiction"}},
            {"$limit": 1}
        ]))
        .unwrap();
        assert_eq!(
            pipeline.leading_match().map(|q| q.to_json().clone()),
            Some(json!({"genre": "Fiction"}))
        );
        assert_eq!(pipeline.len(), 2);
    }

    // ========== Group ==========

    #[test]
    fn test_group_avg_by_genre() {
        let docs = vec![
            json!({"genre": "Fiction", "price": 10.0}),
            json!({"genre": "Dystopian", "price": 8.0}),
            json!({"genre": "Fiction", "price": 20.0}),
        ];
        let results = run(
            json!([{"$group": {"_id": "$genre", "average_price": {"$avg": "$price"}}}]),
            docs,
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], json!({"_id": "Fiction", "average_price": 15.0}));
        assert_eq!(results[1], json!({"_id": "Dystopian", "average_price": 8.0}));
    }

    #[test]
    fn test_group_avg_without_numbers_is_null() {
        let docs = vec![json!({"genre": "Poetry"}), json!({"genre": "Poetry", "price": "n/a"})];
        let results = run(
            json!([{"$group": {"_id": "$genre", "avg": {"$avg": "$price"}}}]),
            docs,
        );
        assert!(results[0]["avg"].is_null());
    }

    #[test]
    fn test_group_preserves_first_encountered_order() {
        let docs = vec![
            json!({"author": "B"}),
            json!({"author": "A"}),
            json!({"author": "B"}),
            json!({"author": "A"}),
            json!({"author": "C"}),
        ];
        let results = run(
            json!([
                {"$group": {"_id": "$author", "count": {"$sum": 1}}},
                {"$sort": {"count": -1}},
                {"$limit": 1}
            ]),
            docs,
        );
        // B and A tie on 2; B was seen first
        assert_eq!(results, vec![json!({"_id": "B", "count": 2})]);
    }

    #[test]
    fn test_group_missing_field_groups_under_null() {
        let docs = vec![json!({"genre": "Fiction"}), json!({})];
        let results = run(json!([{"$group": {"_id": "$genre", "n": {"$count": {}}}}]), docs);
        assert_eq!(results.len(), 2);
        assert!(results[1]["_id"].is_null());
        assert_eq!(results[1]["n"], 1);
    }

    #[test]
    fn test_group_by_decade_expression() {
        let docs = vec![
            json!({"published_year": 1954}),
            json!({"published_year": 1960}),
            json!({"published_year": 1949}),
            json!({"published_year": 1951}),
        ];
        let results = run(
            json!([
                {"$group": {
                    "_id": {"$concat": [
                        {"$toString": {"$multiply": [
                            {"$floor": {"$divide": ["$published_year", 10]}}, 10
                        ]}},
                        "s"
                    ]},
                    "count": {"$sum": 1}
                }},
                {"$sort": {"_id": 1}}
            ]),
            docs,
        );
        assert_eq!(
            results,
            vec![
                json!({"_id": "1940s", "count": 1}),
                json!({"_id": "1950s", "count": 2}),
                json!({"_id": "1960s", "count": 1}),
            ]
        );
    }

    #[test]
    fn test_group_compound_id() {
        let docs = vec![
            json!({"author": "A", "genre": "X"}),
            json!({"genre": "X", "author": "A"}),
            json!({"author": "A", "genre": "Y"}),
        ];
        let results = run(
            json!([{"$group": {"_id": {"author": "$author", "genre": "$genre"}, "n": {"$sum": 1}}}]),
            docs,
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["n"], 2);
    }

    #[test]
    fn test_group_parse_errors() {
        assert!(Pipeline::from_json(&json!([{"$group": {"n": {"$sum": 1}}}])).is_err());
        assert!(Pipeline::from_json(&json!([{"$group": {"_id": "genre"}}])).is_err());
        assert!(Pipeline::from_json(&json!([{"$group": {"_id": null, "n": {"$median": "$x"}}}])).is_err());
        assert!(Pipeline::from_json(&json!([{"$group": {"_id": null, "n": 1}}])).is_err());
    }

    #[test]
    fn test_accumulators() {
        let docs = vec![
            json!({"v": 3, "s": "first"}),
            json!({"v": 1.5}),
            json!({"v": 6, "s": "last"}),
        ];
        let results = run(
            json!([{"$group": {
                "_id": null,
                "sum": {"$sum": "$v"},
                "min": {"$min": "$v"},
                "max": {"$max": "$v"},
                "first": {"$first": "$s"},
                "last": {"$last": "$s"},
                "count": {"$sum": 1}
            }}]),
            docs,
        );
        let r = &results[0];
        assert_eq!(r["sum"], 10.5);
        assert_eq!(r["min"], 1.5);
        assert_eq!(r["max"], 6);
        assert_eq!(r["first"], "first");
        assert_eq!(r["last"], "last");
        assert_eq!(r["count"], 3);
    }

    // ========== Expressions ==========

    #[test]
    fn test_expression_null_propagation() {
        let expr = Expression::from_json(&json!({"$multiply": ["$missing", 10]})).unwrap();
        assert!(expr.evaluate(&json!({})).unwrap().is_null());

        let expr = Expression::from_json(&json!({"$concat": ["$title", "!"]})).unwrap();
        assert!(expr.evaluate(&json!({})).unwrap().is_null());

        let expr = Expression::from_json(&json!({"$ifNull": ["$genre", "Unknown"]})).unwrap();
        assert_eq!(expr.evaluate(&json!({})).unwrap(), json!("Unknown"));
    }

    #[test]
    fn test_expression_errors() {
        assert!(Expression::from_json(&json!({"$pow": [2, 3]})).is_err());
        assert!(Expression::from_json(&json!({"$divide": [1]})).is_err());

        let expr = Expression::from_json(&json!({"$divide": ["$n", 0]})).unwrap();
        assert!(expr.evaluate(&json!({"n": 4})).is_err());

        let expr = Expression::from_json(&json!({"$floor": "$title"})).unwrap();
        assert!(expr.evaluate(&json!({"title": "Emma"})).is_err());
    }

    #[test]
    fn test_to_string_keeps_integral_numbers_integral() {
        let expr = Expression::from_json(&json!({"$toString": {"$divide": ["$n", 2]}})).unwrap();
        assert_eq!(expr.evaluate(&json!({"n": 3900})).unwrap(), json!("1950"));
        assert_eq!(expr.evaluate(&json!({"n": 5})).unwrap(), json!("2.5"));
    }

    // ========== Other stages ==========

    #[test]
    fn test_match_sort_skip_limit() {
        let docs: Vec<Value> = (1..=6).map(|i| json!({"i": i, "even": i % 2 == 0})).collect();
        let results = run(
            json!([
                {"$match": {"even": true}},
                {"$sort": {"i": -1}},
                {"$skip": 1},
                {"$limit": 5}
            ]),
            docs,
        );
        assert_eq!(results, vec![json!({"i": 4, "even": true}), json!({"i": 2, "even": true})]);
    }

    #[test]
    fn test_project_include_rename_and_exclude() {
        let docs = vec![json!({"_id": 1, "title": "Emma", "price": 7.5, "meta": {"isbn": "x"}})];

        let included = run(
            json!([{"$project": {"_id": 0, "title": 1, "isbn": "$meta.isbn"}}]),
            docs.clone(),
        );
        assert_eq!(included, vec![json!({"title": "Emma", "isbn": "x"})]);

        let excluded = run(json!([{"$project": {"meta": 0}}]), docs);
        assert_eq!(excluded, vec![json!({"_id": 1, "title": "Emma", "price": 7.5})]);

        assert!(Pipeline::from_json(&json!([{"$project": {"title": 1, "price": 0}}])).is_err());
        assert!(Pipeline::from_json(&json!([{"$project": {"title": "name"}}])).is_err());
    }

    #[test]
    fn test_count_stage() {
        let docs = vec![json!({"a": 1}), json!({"a": 2})];
        assert_eq!(run(json!([{"$count": "total"}]), docs), vec![json!({"total": 2})]);
        assert!(run(json!([{"$count": "total"}]), vec![]).is_empty());
    }
}
