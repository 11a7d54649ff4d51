// shelfbase-core/src/report/mod.rs
//! Book-catalog reports
//!
//! A [`ReportCatalog`] is an ordered list of named operations. The
//! [`ReportGenerator`] runs it against any
//! [`DocumentCollection`](crate::client::DocumentCollection), one report at a
//! time, handing each outcome to a [`ReportSink`] before the next one starts.

mod catalog;
mod generator;
mod sink;

pub use catalog::{ReportCatalog, ReportKind, ReportOperation, ReportSpec};
pub use generator::ReportGenerator;
pub use sink::{CollectingSink, ReportSink};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::error::{FailureKind, ShelfError};

/// What a successful report produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPayload {
    Documents(Vec<Value>),
    Groups(Vec<Value>),
    Index { name: String },
    Plan(Value),
    Update { matched: u64, modified: u64 },
    Delete { deleted: u64 },
}

impl ReportPayload {
    /// Documents or groups returned; None for the other payloads
    pub fn item_count(&self) -> Option<usize> {
        match self {
            ReportPayload::Documents(docs) | ReportPayload::Groups(docs) => Some(docs.len()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ReportPayload::Documents(docs) | ReportPayload::Groups(docs) => {
                Value::Array(docs.clone())
            }
            ReportPayload::Index { name } => json!({ "index": name }),
            ReportPayload::Plan(plan) => plan.clone(),
            ReportPayload::Update { matched, modified } => {
                json!({ "matched_count": matched, "modified_count": modified })
            }
            ReportPayload::Delete { deleted } => json!({ "deleted_count": deleted }),
        }
    }
}

/// A failed report: operation name, failure class and the store's message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{report}: {kind} failure: {cause}")]
pub struct ReportError {
    pub report: String,
    pub kind: FailureKind,
    pub cause: String,
}

impl ReportError {
    pub fn from_store(report: &str, err: &ShelfError) -> Self {
        ReportError {
            report: report.to_string(),
            kind: err.kind(),
            cause: err.to_string(),
        }
    }

    /// Connection failures end the run
    pub fn is_fatal(&self) -> bool {
        self.kind == FailureKind::Connection
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportOutcome {
    pub name: String,
    pub kind: ReportKind,
    pub result: Result<ReportPayload, ReportError>,
}

impl ReportOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn to_json(&self) -> Value {
        match self.result {
            Ok(ref payload) => json!({
                "report": self.name,
                "kind": self.kind.as_str(),
                "status": "ok",
                "result": payload.to_json(),
            }),
            Err(ref err) => json!({
                "report": self.name,
                "kind": self.kind.as_str(),
                "status": "error",
                "failure": err.kind.as_str(),
                "error": err.to_string(),
            }),
        }
    }
}

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcomes: Vec<ReportOutcome>,
    /// A connection failure stopped the run early
    pub aborted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        !self.aborted && self.failed() == 0
    }

    pub fn errors(&self) -> impl Iterator<Item = &ReportError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    pub fn outcome(&self, name: &str) -> Option<&ReportOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "started_at": self.started_at.to_rfc3339(),
            "finished_at": self.finished_at.to_rfc3339(),
            "aborted": self.aborted,
            "succeeded": self.succeeded(),
            "failed": self.failed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_error_display() {
        let err = ReportError::from_store(
            "fiction-books",
            &ShelfError::InvalidQuery("Unknown operator: $after".into()),
        );
        assert_eq!(
            err.to_string(),
            "fiction-books: query failure: Invalid query: Unknown operator: $after"
        );
        assert!(!err.is_fatal());
        assert!(ReportError::from_store("x", &ShelfError::Connection("lost".into())).is_fatal());
    }

    #[test]
    fn test_payload_json() {
        assert_eq!(
            ReportPayload::Update { matched: 1, modified: 0 }.to_json(),
            json!({"matched_count": 1, "modified_count": 0})
        );
        assert_eq!(ReportPayload::Groups(vec![json!({})]).item_count(), Some(1));
        assert_eq!(ReportPayload::Delete { deleted: 1 }.item_count(), None);
    }

    #[test]
    fn test_summary_counts() {
        let now = Utc::now();
        let ok = ReportOutcome {
            name: "a".into(),
            kind: ReportKind::Filter,
            result: Ok(ReportPayload::Documents(vec![])),
        };
        let failed = ReportOutcome {
            name: "b".into(),
            kind: ReportKind::CreateIndex,
            result: Err(ReportError {
                report: "b".into(),
                kind: FailureKind::Index,
                cause: "boom".into(),
            }),
        };
        let summary = RunSummary {
            outcomes: vec![ok, failed],
            aborted: false,
            started_at: now,
            finished_at: now,
        };
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(!summary.is_success());
        assert_eq!(summary.errors().count(), 1);
        assert_eq!(summary.outcome("b").unwrap().to_json()["failure"], "index");
    }
}
