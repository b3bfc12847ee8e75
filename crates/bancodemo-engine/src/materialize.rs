use std::path::Path;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::{error, info};

use bancodemo_core::{
    FieldValue, RunConfig, SchemaRegistry, SemanticType, StorageTarget, TableSchema, TableSpec,
};

use crate::errors::MaterializeError;
use crate::report::{RunReport, TableRunReport};
use crate::sink::{CatalogSink, FlatFileSink, GeneratedBatch, Layout, WriteMode};
use crate::source::RowSource;

/// Managed tables always use parquet regardless of the configured file
/// format, so they stay queryable by the serving engine.
pub const CATALOG_FORMAT: &str = "parquet";

/// Stamp column appended to every materialized batch.
pub const EXECUTION_DATE_COLUMN: &str = "data_execucao";

/// Which kind of sink a materialization writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Catalog,
    FlatFile,
}

impl TargetKind {
    pub fn of(target: &StorageTarget) -> Self {
        match target {
            StorageTarget::Catalog { .. } => TargetKind::Catalog,
            StorageTarget::FlatFile { .. } => TargetKind::FlatFile,
        }
    }
}

/// Write mode and layout derived per table from its spec and the current
/// catalog state. Computed fresh each run, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteDecision {
    pub mode: WriteMode,
    pub layout: Layout,
}

impl WriteDecision {
    /// Partition is checked before bucket: when both flags are set, the
    /// partitioned layout wins.
    pub fn decide(spec: &TableSpec, target: TargetKind, exists: bool) -> Self {
        let layout = if spec.partitioned {
            Layout::PartitionByDate
        } else if spec.bucketed {
            Layout::BucketByKey {
                column: spec.clustered_by.clone(),
                buckets: spec.num_buckets,
            }
        } else {
            Layout::None
        };
        let mode = match target {
            TargetKind::FlatFile => WriteMode::Overwrite,
            TargetKind::Catalog => {
                if exists {
                    WriteMode::Append
                } else {
                    WriteMode::Overwrite
                }
            }
        };
        Self { mode, layout }
    }
}

/// Executes the per-table write policy against a row source and an engine
/// session implementing both sink traits.
pub struct Materializer<'a, R, E>
where
    R: RowSource,
    E: CatalogSink + FlatFileSink,
{
    source: &'a mut R,
    engine: &'a mut E,
    execution_date: NaiveDate,
}

impl<'a, R, E> Materializer<'a, R, E>
where
    R: RowSource,
    E: CatalogSink + FlatFileSink,
{
    pub fn new(source: &'a mut R, engine: &'a mut E, execution_date: NaiveDate) -> Self {
        Self {
            source,
            engine,
            execution_date,
        }
    }

    pub fn execution_date(&self) -> NaiveDate {
        self.execution_date
    }

    /// Materialize one table: resolve existence, generate and stamp rows,
    /// derive the write decision, and execute the write.
    pub fn materialize(
        &mut self,
        spec: &TableSpec,
        schema: &TableSchema,
        target: &StorageTarget,
    ) -> Result<TableRunReport, MaterializeError> {
        let exists = match target {
            StorageTarget::Catalog { .. } => self.engine.table_exists(&spec.name)?,
            StorageTarget::FlatFile { .. } => false,
        };

        let rows = self.source.generate(&spec.name, spec.num_records)?;
        if rows.len() as u64 != spec.num_records {
            return Err(MaterializeError::Data(format!(
                "row source returned {} rows for '{}', expected {}",
                rows.len(),
                spec.name,
                spec.num_records
            )));
        }
        let batch = stamp_batch(schema, rows, self.execution_date);

        let decision = WriteDecision::decide(spec, TargetKind::of(target), exists);
        match target {
            StorageTarget::Catalog { .. } => {
                if decision.mode == WriteMode::Append {
                    self.engine.refresh_metadata(&spec.name)?;
                }
                self.engine.write_table(
                    &spec.name,
                    &batch,
                    decision.mode,
                    &decision.layout,
                    CATALOG_FORMAT,
                )?;
            }
            StorageTarget::FlatFile { base_path, format } => {
                let path = Path::new(base_path).join(&spec.name);
                self.engine
                    .write_files(&path, &batch, decision.mode, format, &decision.layout)?;
            }
        }

        Ok(TableRunReport {
            table: spec.name.clone(),
            rows_requested: spec.num_records,
            rows_written: batch.rows.len() as u64,
            mode: Some(format!("{:?}", decision.mode).to_lowercase()),
            layout: Some(decision.layout.describe()),
            error: None,
        })
    }
}

/// Append the execution-date column to schema and rows. Every row in the
/// batch carries the same stamp.
fn stamp_batch(schema: &TableSchema, mut rows: Vec<bancodemo_core::Row>, date: NaiveDate) -> GeneratedBatch {
    for row in &mut rows {
        row.insert(EXECUTION_DATE_COLUMN.to_string(), FieldValue::Date(date));
    }
    GeneratedBatch {
        schema: schema.with_column(EXECUTION_DATE_COLUMN, SemanticType::Date),
        rows,
    }
}

/// Main loop: tables one at a time, in configured order. Per-table failures
/// are logged and skipped; the loop continues.
pub fn run_materialization<R, E>(
    config: &RunConfig,
    registry: &SchemaRegistry,
    source: &mut R,
    engine: &mut E,
    execution_date: NaiveDate,
) -> RunReport
where
    R: RowSource,
    E: CatalogSink + FlatFileSink,
{
    let start = Instant::now();
    let run_id = uuid::Uuid::new_v4().to_string();
    let target = config.target();
    let mut report = RunReport::new(run_id.clone(), execution_date.to_string());
    let mut materializer = Materializer::new(source, engine, execution_date);

    info!(
        run_id = %run_id,
        tables = config.tables.len(),
        file_only = config.file_only,
        "materialization started"
    );

    for spec in &config.tables {
        info!(table = %spec.name, rows = spec.num_records, "materializing table");
        let outcome = registry
            .schema_for(&spec.name)
            .map_err(MaterializeError::from)
            .and_then(|schema| materializer.materialize(spec, &schema, &target));
        match outcome {
            Ok(table_report) => {
                info!(
                    table = %spec.name,
                    rows_written = table_report.rows_written,
                    mode = table_report.mode.as_deref().unwrap_or(""),
                    layout = table_report.layout.as_deref().unwrap_or(""),
                    "table materialized"
                );
                report.record_success(table_report);
            }
            Err(err) => {
                error!(table = %spec.name, error = %err, "table skipped");
                report.record_failure(&spec.name, spec.num_records, err.to_string());
            }
        }
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        run_id = %run_id,
        tables = report.tables.len(),
        failures = report.failures,
        duration_ms = report.duration_ms,
        "materialization completed"
    );
    report
}
