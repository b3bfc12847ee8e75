//! Materialization and reconciliation engine for the bancodemo pipeline.
//!
//! This crate decides how each configured table is written (create vs.
//! append, partitioned vs. bucketed, managed table vs. raw files), pulls
//! rows from a [`RowSource`], and re-keys the transaction fact table so its
//! foreign key follows a near-uniform draw over the customer dimension.

pub mod analytics;
pub mod errors;
pub mod materialize;
pub mod reconcile;
pub mod report;
pub mod sink;
pub mod source;
pub mod warehouse;

pub use errors::MaterializeError;
pub use materialize::{
    CATALOG_FORMAT, EXECUTION_DATE_COLUMN, Materializer, TargetKind, WriteDecision,
    run_materialization,
};
pub use reconcile::{ReconcileOutcome, reconcile_rows, reconcile_tables};
pub use report::{RunReport, TableRunReport};
pub use sink::{CatalogSink, FlatFileSink, GeneratedBatch, Layout, TableRows, WriteMode};
pub use source::{DemoRowSource, RowSource};
pub use warehouse::LocalWarehouse;
