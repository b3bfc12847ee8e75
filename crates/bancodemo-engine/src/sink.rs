use std::path::Path;

use serde::{Deserialize, Serialize};

use bancodemo_core::{Row, TableSchema};

use crate::errors::MaterializeError;

/// How a write lands relative to existing table contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    Overwrite,
    Append,
}

/// Physical layout of written data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    None,
    /// One directory per execution-date value.
    PartitionByDate,
    /// Fixed number of files, rows routed by a hash of the key column.
    BucketByKey { column: String, buckets: u32 },
}

impl Layout {
    pub fn describe(&self) -> String {
        match self {
            Layout::None => "none".to_string(),
            Layout::PartitionByDate => "partition_by_date".to_string(),
            Layout::BucketByKey { column, buckets } => {
                format!("bucket_by_key({column}, {buckets})")
            }
        }
    }
}

/// Rows stamped and ready for one write call. Ephemeral; the schema already
/// includes the execution-date column.
#[derive(Debug, Clone)]
pub struct GeneratedBatch {
    pub schema: TableSchema,
    pub rows: Vec<Row>,
}

/// Rows read back from a managed table.
#[derive(Debug, Clone)]
pub struct TableRows {
    pub schema: TableSchema,
    pub rows: Vec<Row>,
}

/// Write side of the catalog: named, queryable managed tables.
pub trait CatalogSink {
    fn table_exists(&self, table: &str) -> Result<bool, MaterializeError>;

    /// Re-read table metadata so subsequent readers observe up-to-date state.
    /// Issued before every append.
    fn refresh_metadata(&mut self, table: &str) -> Result<(), MaterializeError>;

    fn write_table(
        &mut self,
        table: &str,
        batch: &GeneratedBatch,
        mode: WriteMode,
        layout: &Layout,
        format: &str,
    ) -> Result<(), MaterializeError>;

    /// Query interface used by reconciliation and the analytics views.
    fn read_table(&self, table: &str) -> Result<TableRows, MaterializeError>;
}

/// Raw file output under a storage path, no catalog registration.
pub trait FlatFileSink {
    fn write_files(
        &mut self,
        path: &Path,
        batch: &GeneratedBatch,
        mode: WriteMode,
        format: &str,
        layout: &Layout,
    ) -> Result<(), MaterializeError>;
}
