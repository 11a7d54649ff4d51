// shelfbase-core/src/lib.rs
// Embedded document store and the book-catalog report generator

pub mod aggregation;
pub mod client;
pub mod collection_core;
pub mod config;
pub mod dataset;
pub mod database;
pub mod document;
pub mod error;
pub mod find_options;
pub mod index;
pub mod query;
pub mod query_planner;
pub mod report;
pub mod storage;
pub mod value_utils;

// Public exports
pub use aggregation::Pipeline;
pub use client::{DeleteResult, DocumentCollection, UpdateResult};
pub use collection_core::{CollectionCore, InsertManyResult};
pub use config::{ConfigOverrides, ConnectionConfig, Endpoint};
pub use database::{DatabaseCore, Session};
pub use document::{BookRecord, Document, DocumentId};
pub use error::{FailureKind, Result, ShelfError};
pub use find_options::{FindOptions, SortDirection};
pub use index::IndexModel;
pub use query::Query;
pub use query_planner::{QueryPlan, QueryPlanner};
pub use report::{
    CollectingSink, ReportCatalog, ReportError, ReportGenerator, ReportKind, ReportOperation,
    ReportOutcome, ReportPayload, ReportSink, ReportSpec, RunSummary,
};
pub use storage::{Backend, FileStorage, MemoryStorage, Storage};
