// shelfbase-core/src/report/generator.rs
// Sequential report execution with per-report error isolation

use chrono::Utc;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::{
    ReportCatalog, ReportError, ReportOperation, ReportOutcome, ReportPayload, ReportSink,
    ReportSpec, RunSummary,
};
use crate::client::DocumentCollection;
use crate::error::Result;
use crate::find_options::FindOptions;
use crate::index::IndexModel;

/// Runs a [`ReportCatalog`] against a collection.
///
/// A failing report is recorded and the run moves on, except for
/// connection failures, which stop the run.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    catalog: ReportCatalog,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::canonical()
    }
}

impl ReportGenerator {
    pub fn new(catalog: ReportCatalog) -> Self {
        ReportGenerator { catalog }
    }

    pub fn canonical() -> Self {
        Self::new(ReportCatalog::canonical())
    }

    pub fn catalog(&self) -> &ReportCatalog {
        &self.catalog
    }

    pub fn run<C>(&self, collection: &C, sink: &mut dyn ReportSink) -> RunSummary
    where
        C: DocumentCollection + ?Sized,
    {
        let started_at = Utc::now();
        let namespace = collection.namespace();
        info!(namespace = %namespace, reports = self.catalog.len(), "report run started");

        let mut outcomes = Vec::with_capacity(self.catalog.len());
        let mut aborted = false;

        for spec in &self.catalog {
            let timer = Instant::now();
            let result =
                execute(collection, spec).map_err(|e| ReportError::from_store(&spec.name, &e));
            let elapsed_ms = timer.elapsed().as_millis() as u64;

            match result {
                Ok(ref payload) => info!(
                    report = %spec.name,
                    kind = %spec.kind(),
                    items = ?payload.item_count(),
                    elapsed_ms,
                    "report finished"
                ),
                Err(ref err) if err.is_fatal() => {
                    error!(report = %spec.name, error = %err, "connection lost, aborting run")
                }
                Err(ref err) => {
                    warn!(report = %spec.name, failure = %err.kind, error = %err, "report failed")
                }
            }

            let outcome = ReportOutcome {
                name: spec.name.clone(),
                kind: spec.kind(),
                result,
            };
            sink.emit(&outcome);
            let fatal = matches!(outcome.result, Err(ref e) if e.is_fatal());
            outcomes.push(outcome);

            if fatal {
                aborted = true;
                break;
            }
        }

        let summary = RunSummary {
            outcomes,
            aborted,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            namespace = %namespace,
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            aborted,
            "report run finished"
        );
        summary
    }
}

fn projected(options: FindOptions, fields: &[String]) -> FindOptions {
    if fields.is_empty() {
        return options;
    }
    let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
    options.with_fields(&fields)
}

fn execute<C>(collection: &C, spec: &ReportSpec) -> Result<ReportPayload>
where
    C: DocumentCollection + ?Sized,
{
    debug!(report = %spec.name, params = %spec.operation.describe(), "running report");

    match spec.operation {
        ReportOperation::Filter { ref filter } => {
            let docs = collection.find(filter, &FindOptions::new())?;
            Ok(ReportPayload::Documents(docs))
        }
        ReportOperation::FilterProjection {
            ref filter,
            ref fields,
        } => {
            let options = projected(FindOptions::new(), fields);
            Ok(ReportPayload::Documents(collection.find(filter, &options)?))
        }
        ReportOperation::Sort {
            ref filter,
            ref field,
            direction,
            ref fields,
        } => {
            let options = projected(FindOptions::new().sort_by(field, direction), fields);
            Ok(ReportPayload::Documents(collection.find(filter, &options)?))
        }
        ReportOperation::Paginate {
            ref filter,
            ref sort_field,
            direction,
            skip,
            limit,
            ref fields,
        } => {
            let options = FindOptions::new()
                .sort_by(sort_field, direction)
                .with_skip(skip)
                .with_limit(limit);
            let options = projected(options, fields);
            Ok(ReportPayload::Documents(collection.find(filter, &options)?))
        }
        ReportOperation::Aggregate { ref pipeline } => {
            Ok(ReportPayload::Groups(collection.aggregate(pipeline)?))
        }
        ReportOperation::CreateIndex { ref keys } => {
            let name = collection.create_index(IndexModel::new(keys.clone()))?;
            Ok(ReportPayload::Index { name })
        }
        ReportOperation::Explain { ref filter } => {
            Ok(ReportPayload::Plan(collection.explain(filter)?))
        }
        ReportOperation::UpdateByTitle {
            ref title,
            ref field,
            ref value,
        } => {
            let mut set = serde_json::Map::new();
            set.insert(field.clone(), value.clone());
            let update = json!({ "$set": Value::Object(set) });
            let result = collection.update_one(&title_filter(title), &update)?;
            Ok(ReportPayload::Update {
                matched: result.matched_count,
                modified: result.modified_count,
            })
        }
        ReportOperation::DeleteByTitle { ref title } => {
            let result = collection.delete_one(&title_filter(title))?;
            Ok(ReportPayload::Delete {
                deleted: result.deleted_count,
            })
        }
    }
}

fn title_filter(title: &str) -> Value {
    json!({ "title": title })
}
