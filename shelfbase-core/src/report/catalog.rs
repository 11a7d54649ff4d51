// shelfbase-core/src/report/catalog.rs
// Static, ordered catalog of report operations

use serde_json::{json, Value};
use std::fmt;

use crate::error::{Result, ShelfError};
use crate::find_options::SortDirection;

/// Report kinds, as listed by `shelfbase list`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Filter,
    FilterProjection,
    Sort,
    Paginate,
    Aggregate,
    CreateIndex,
    Explain,
    UpdateByTitle,
    DeleteByTitle,
}

impl ReportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportKind::Filter => "filter",
            ReportKind::FilterProjection => "filter+projection",
            ReportKind::Sort => "sort",
            ReportKind::Paginate => "paginate",
            ReportKind::Aggregate => "aggregate",
            ReportKind::CreateIndex => "create-index",
            ReportKind::Explain => "explain",
            ReportKind::UpdateByTitle => "update-by-title",
            ReportKind::DeleteByTitle => "delete-by-title",
        }
    }

    /// Only these two kinds write to the collection
    pub fn is_mutation(self) -> bool {
        matches!(self, ReportKind::UpdateByTitle | ReportKind::DeleteByTitle)
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific parameters
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOperation {
    Filter {
        filter: Value,
    },
    FilterProjection {
        filter: Value,
        fields: Vec<String>,
    },
    /// `fields` empty means whole documents
    Sort {
        filter: Value,
        field: String,
        direction: SortDirection,
        fields: Vec<String>,
    },
    Paginate {
        filter: Value,
        sort_field: String,
        direction: SortDirection,
        skip: usize,
        limit: usize,
        fields: Vec<String>,
    },
    Aggregate {
        pipeline: Value,
    },
    CreateIndex {
        keys: Vec<(String, SortDirection)>,
    },
    Explain {
        filter: Value,
    },
    UpdateByTitle {
        title: String,
        field: String,
        value: Value,
    },
    DeleteByTitle {
        title: String,
    },
}

impl ReportOperation {
    pub fn kind(&self) -> ReportKind {
        match self {
            ReportOperation::Filter { .. } => ReportKind::Filter,
            ReportOperation::FilterProjection { .. } => ReportKind::FilterProjection,
            ReportOperation::Sort { .. } => ReportKind::Sort,
            ReportOperation::Paginate { .. } => ReportKind::Paginate,
            ReportOperation::Aggregate { .. } => ReportKind::Aggregate,
            ReportOperation::CreateIndex { .. } => ReportKind::CreateIndex,
            ReportOperation::Explain { .. } => ReportKind::Explain,
            ReportOperation::UpdateByTitle { .. } => ReportKind::UpdateByTitle,
            ReportOperation::DeleteByTitle { .. } => ReportKind::DeleteByTitle,
        }
    }

    /// One-line rendering of the parameters for listings
    pub fn describe(&self) -> String {
        fn dir(d: SortDirection) -> &'static str {
            match d {
                SortDirection::Ascending => "asc",
                SortDirection::Descending => "desc",
            }
        }
        match self {
            ReportOperation::Filter { filter } => filter.to_string(),
            ReportOperation::FilterProjection { filter, fields } => {
                format!("{} -> [{}]", filter, fields.join(", "))
            }
            ReportOperation::Sort {
                field, direction, ..
            } => format!("by {} {}", field, dir(*direction)),
            ReportOperation::Paginate {
                sort_field,
                direction,
                skip,
                limit,
                ..
            } => format!("by {} {}, skip {}, limit {}", sort_field, dir(*direction), skip, limit),
            ReportOperation::Aggregate { pipeline } => {
                format!("{} stage(s)", pipeline.as_array().map_or(0, Vec::len))
            }
            ReportOperation::CreateIndex { keys } => keys
                .iter()
                .map(|(field, d)| format!("{} {}", field, dir(*d)))
                .collect::<Vec<_>>()
                .join(", "),
            ReportOperation::Explain { filter } => filter.to_string(),
            ReportOperation::UpdateByTitle { title, field, value } => {
                format!("\"{}\": set {} = {}", title, field, value)
            }
            ReportOperation::DeleteByTitle { title } => format!("\"{}\"", title),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSpec {
    pub name: String,
    pub operation: ReportOperation,
}

impl ReportSpec {
    pub fn new(name: &str, operation: ReportOperation) -> Self {
        ReportSpec {
            name: name.to_string(),
            operation,
        }
    }

    pub fn kind(&self) -> ReportKind {
        self.operation.kind()
    }
}

/// Ordered report list; names are unique
#[derive(Debug, Clone, PartialEq)]
pub struct ReportCatalog {
    specs: Vec<ReportSpec>,
}

fn strings(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

impl ReportCatalog {
    pub fn new(specs: Vec<ReportSpec>) -> Result<Self> {
        for (i, spec) in specs.iter().enumerate() {
            if spec.name.is_empty() {
                return Err(ShelfError::Config("report names cannot be empty".to_string()));
            }
            if specs[..i].iter().any(|s| s.name == spec.name) {
                return Err(ShelfError::Config(format!(
                    "duplicate report name '{}'",
                    spec.name
                )));
            }
        }
        Ok(ReportCatalog { specs })
    }

    /// The eighteen bookstore reports, in execution order
    pub fn canonical() -> Self {
        use ReportOperation::*;
        use SortDirection::{Ascending, Descending};

        let specs = vec![
            ReportSpec::new("all-books", Filter { filter: json!({}) }),
            ReportSpec::new(
                "books-by-author",
                Filter {
                    filter: json!({"author": "George Orwell"}),
                },
            ),
            ReportSpec::new(
                "published-after-1950",
                Filter {
                    filter: json!({"published_year": {"$gt": 1950}}),
                },
            ),
            ReportSpec::new(
                "fiction-books",
                Filter {
                    filter: json!({"genre": "Fiction"}),
                },
            ),
            ReportSpec::new(
                "in-stock-books",
                Filter {
                    filter: json!({"in_stock": true}),
                },
            ),
            ReportSpec::new(
                "in-stock-after-2010",
                FilterProjection {
                    filter: json!({"in_stock": true, "published_year": {"$gt": 2010}}),
                    fields: strings(&["title", "author", "price"]),
                },
            ),
            ReportSpec::new(
                "price-ascending",
                Sort {
                    filter: json!({}),
                    field: "price".to_string(),
                    direction: Ascending,
                    fields: strings(&["title", "price"]),
                },
            ),
            ReportSpec::new(
                "price-descending",
                Sort {
                    filter: json!({}),
                    field: "price".to_string(),
                    direction: Descending,
                    fields: strings(&["title", "price"]),
                },
            ),
            ReportSpec::new(
                "page-1",
                Paginate {
                    filter: json!({}),
                    sort_field: "title".to_string(),
                    direction: Ascending,
                    skip: 0,
                    limit: 5,
                    fields: strings(&["title"]),
                },
            ),
            ReportSpec::new(
                "page-2",
                Paginate {
                    filter: json!({}),
                    sort_field: "title".to_string(),
                    direction: Ascending,
                    skip: 5,
                    limit: 5,
                    fields: strings(&["title"]),
                },
            ),
            ReportSpec::new(
                "average-price-by-genre",
                Aggregate {
                    pipeline: json!([
                        {"$group": {"_id": "$genre", "average_price": {"$avg": "$price"}}},
                        {"$match": {"average_price": {"$ne": null}}},
                        {"$sort": {"_id": 1}}
                    ]),
                },
            ),
            ReportSpec::new(
                "author-with-most-books",
                Aggregate {
                    pipeline: json!([
                        {"$group": {"_id": "$author", "book_count": {"$sum": 1}}},
                        {"$sort": {"book_count": -1}},
                        {"$limit": 1}
                    ]),
                },
            ),
            ReportSpec::new(
                "books-by-decade",
                Aggregate {
                    pipeline: json!([
                        {"$match": {"published_year": {"$type": "number"}}},
                        {"$group": {
                            "_id": {"$multiply": [
                                {"$floor": {"$divide": ["$published_year", 10]}},
                                10
                            ]},
                            "count": {"$sum": 1}
                        }},
                        {"$sort": {"_id": 1}},
                        {"$project": {
                            "_id": {"$concat": [{"$toString": "$_id"}, "s"]},
                            "count": 1
                        }}
                    ]),
                },
            ),
            ReportSpec::new(
                "update-price-1984",
                UpdateByTitle {
                    title: "1984".to_string(),
                    field: "price".to_string(),
                    value: json!(12.99),
                },
            ),
            ReportSpec::new(
                "delete-moby-dick",
                DeleteByTitle {
                    title: "Moby Dick".to_string(),
                },
            ),
            ReportSpec::new(
                "index-title",
                CreateIndex {
                    keys: vec![("title".to_string(), Ascending)],
                },
            ),
            ReportSpec::new(
                "index-author-year",
                CreateIndex {
                    keys: vec![
                        ("author".to_string(), Ascending),
                        ("published_year".to_string(), Descending),
                    ],
                },
            ),
            ReportSpec::new(
                "explain-title-lookup",
                Explain {
                    filter: json!({"title": "1984"}),
                },
            ),
        ];

        ReportCatalog { specs }
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ReportSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Subset in catalog order; an unknown name is an error
    pub fn only<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        if let Some(unknown) = names.iter().find(|n| self.get(n.as_ref()).is_none()) {
            return Err(ShelfError::Config(format!(
                "unknown report '{}' (known: {})",
                unknown.as_ref(),
                self.names().join(", ")
            )));
        }
        let specs = self
            .specs
            .iter()
            .filter(|s| names.iter().any(|n| n.as_ref() == s.name))
            .cloned()
            .collect();
        Ok(ReportCatalog { specs })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReportSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl<'a> IntoIterator for &'a ReportCatalog {
    type Item = &'a ReportSpec;
    type IntoIter = std::slice::Iter<'a, ReportSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}
