//! Core contracts and helpers for the bancodemo pipeline.
//!
//! This crate defines the typed run configuration, the per-table schema
//! contract, and the field-value model shared by the engine and the CLI.

pub mod config;
pub mod error;
pub mod schema;
pub mod value;

pub use config::{RunConfig, StorageKind, StorageSettings, StorageTarget, TableSpec};
pub use error::{ConfigError, SchemaError};
pub use schema::{ColumnDef, SchemaRegistry, SemanticType, TableSchema};
pub use value::{FieldValue, Row};

/// Current contract version for `<table>.json` schema artifacts.
pub const SCHEMA_VERSION: &str = "0.1";
