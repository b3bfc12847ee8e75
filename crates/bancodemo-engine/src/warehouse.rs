use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use bancodemo_core::{FieldValue, Row, SemanticType, TableSchema};

use crate::errors::MaterializeError;
use crate::materialize::EXECUTION_DATE_COLUMN;
use crate::sink::{CatalogSink, FlatFileSink, GeneratedBatch, Layout, TableRows, WriteMode};

const META_FILE: &str = "_meta.json";

/// Per-table manifest. The development engine always persists CSV bytes and
/// records the requested file format here.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableMeta {
    format: String,
    layout: Layout,
    schema: TableSchema,
    commits: u32,
}

/// Single-session, filesystem-backed warehouse standing in for the real
/// execution engine. One directory per database, one per table, a manifest
/// plus CSV part files per table. All calls are synchronous.
#[derive(Debug)]
pub struct LocalWarehouse {
    root: PathBuf,
    database: String,
}

impl LocalWarehouse {
    /// Open the warehouse session, creating the database directory if it does
    /// not exist yet.
    pub fn open(base_path: impl Into<PathBuf>, database: &str) -> Result<Self, MaterializeError> {
        let root = base_path.into();
        let db_dir = root.join(database);
        fs::create_dir_all(&db_dir)?;
        info!(database = %database, path = %db_dir.display(), "warehouse session opened");
        Ok(Self {
            root,
            database: database.to_string(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Tables registered in the current database, sorted by name.
    pub fn list_tables(&self) -> Result<Vec<String>, MaterializeError> {
        let db_dir = self.root.join(&self.database);
        let mut tables = Vec::new();
        if !db_dir.exists() {
            return Ok(tables);
        }
        for entry in fs::read_dir(&db_dir)? {
            let path = entry?.path();
            if path.is_dir() && path.join(META_FILE).exists()
                && let Some(name) = path.file_name().and_then(|name| name.to_str())
            {
                tables.push(name.to_string());
            }
        }
        tables.sort();
        Ok(tables)
    }

    /// Drop every table, then the database directory itself. Returns false
    /// when the database was absent.
    pub fn drop_database(&self) -> Result<bool, MaterializeError> {
        let db_dir = self.root.join(&self.database);
        if !db_dir.exists() {
            return Ok(false);
        }
        for table in self.list_tables()? {
            info!(table = %table, "dropping table");
            fs::remove_dir_all(self.table_dir(&table))?;
        }
        fs::remove_dir_all(&db_dir)?;
        info!(database = %self.database, "database dropped");
        Ok(true)
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(&self.database).join(table)
    }

    fn load_meta(&self, table: &str) -> Result<TableMeta, MaterializeError> {
        let path = self.table_dir(table).join(META_FILE);
        if !path.exists() {
            return Err(MaterializeError::Write(format!(
                "table '{table}' does not exist in database '{}'",
                self.database
            )));
        }
        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl CatalogSink for LocalWarehouse {
    fn table_exists(&self, table: &str) -> Result<bool, MaterializeError> {
        let exists = self.table_dir(table).join(META_FILE).exists();
        debug!(table = %table, exists, "table existence check");
        Ok(exists)
    }

    fn refresh_metadata(&mut self, table: &str) -> Result<(), MaterializeError> {
        // Re-reads the manifest so externally-modified table state is
        // observed before the next write.
        let _ = self.load_meta(table)?;
        debug!(table = %table, "table metadata refreshed");
        Ok(())
    }

    fn write_table(
        &mut self,
        table: &str,
        batch: &GeneratedBatch,
        mode: WriteMode,
        layout: &Layout,
        format: &str,
    ) -> Result<(), MaterializeError> {
        let dir = self.table_dir(table);
        match mode {
            WriteMode::Overwrite => {
                if dir.exists() {
                    fs::remove_dir_all(&dir)?;
                }
                fs::create_dir_all(&dir)?;
                write_commit(&dir, batch, layout, 0)?;
                store_meta(
                    &dir,
                    &TableMeta {
                        format: format.to_string(),
                        layout: layout.clone(),
                        schema: batch.schema.clone(),
                        commits: 1,
                    },
                )?;
            }
            WriteMode::Append => {
                let mut meta = self.load_meta(table)?;
                if meta.schema.column_names() != batch.schema.column_names() {
                    return Err(MaterializeError::Write(format!(
                        "schema mismatch appending to '{table}'"
                    )));
                }
                write_commit(&dir, batch, layout, meta.commits)?;
                meta.commits += 1;
                store_meta(&dir, &meta)?;
            }
        }
        debug!(
            table = %table,
            rows = batch.rows.len(),
            mode = ?mode,
            layout = %layout.describe(),
            format = %format,
            "table write committed"
        );
        Ok(())
    }

    fn read_table(&self, table: &str) -> Result<TableRows, MaterializeError> {
        let meta = self.load_meta(table)?;
        let mut files = Vec::new();
        collect_csv_files(&self.table_dir(table), &mut files)?;
        files.sort();
        let mut rows = Vec::new();
        for file in &files {
            read_part(file, &meta.schema, &mut rows)?;
        }
        Ok(TableRows {
            schema: meta.schema,
            rows,
        })
    }
}

impl FlatFileSink for LocalWarehouse {
    fn write_files(
        &mut self,
        path: &Path,
        batch: &GeneratedBatch,
        mode: WriteMode,
        format: &str,
        layout: &Layout,
    ) -> Result<(), MaterializeError> {
        // Flat-file targets are a fresh overwrite of the path on every run.
        if path.exists() {
            fs::remove_dir_all(path)?;
        }
        fs::create_dir_all(path)?;
        write_commit(path, batch, layout, 0)?;
        store_meta(
            path,
            &TableMeta {
                format: format.to_string(),
                layout: layout.clone(),
                schema: batch.schema.clone(),
                commits: 1,
            },
        )?;
        debug!(
            path = %path.display(),
            rows = batch.rows.len(),
            mode = ?mode,
            format = %format,
            "flat files written"
        );
        Ok(())
    }
}

fn collect_csv_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), MaterializeError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_csv_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "csv") {
            out.push(path);
        }
    }
    Ok(())
}

fn store_meta(dir: &Path, meta: &TableMeta) -> Result<(), MaterializeError> {
    fs::write(dir.join(META_FILE), serde_json::to_vec_pretty(meta)?)?;
    Ok(())
}

fn write_commit(
    dir: &Path,
    batch: &GeneratedBatch,
    layout: &Layout,
    commit: u32,
) -> Result<(), MaterializeError> {
    let columns = batch.schema.column_names();
    match layout {
        Layout::None => {
            write_part(
                &dir.join(format!("part-{commit:05}.csv")),
                &columns,
                batch.rows.iter(),
            )?;
        }
        Layout::PartitionByDate => {
            let mut partitions: BTreeMap<String, Vec<&Row>> = BTreeMap::new();
            for row in &batch.rows {
                let date = row
                    .get(EXECUTION_DATE_COLUMN)
                    .map(FieldValue::render)
                    .unwrap_or_default();
                partitions.entry(date).or_default().push(row);
            }
            for (date, rows) in partitions {
                let part_dir = dir.join(format!("{EXECUTION_DATE_COLUMN}={date}"));
                fs::create_dir_all(&part_dir)?;
                write_part(
                    &part_dir.join(format!("part-{commit:05}.csv")),
                    &columns,
                    rows.into_iter(),
                )?;
            }
        }
        Layout::BucketByKey { column, buckets } => {
            let mut routed: Vec<Vec<&Row>> = vec![Vec::new(); *buckets as usize];
            for row in &batch.rows {
                let key = row.get(column).ok_or_else(|| {
                    MaterializeError::Write(format!(
                        "bucket column '{column}' missing from generated rows"
                    ))
                })?;
                let index = (hash_value(key) % u64::from(*buckets)) as usize;
                routed[index].push(row);
            }
            for (index, rows) in routed.into_iter().enumerate() {
                write_part(
                    &dir.join(format!("bucket-{commit:05}-{index:05}.csv")),
                    &columns,
                    rows.into_iter(),
                )?;
            }
        }
    }
    Ok(())
}

fn write_part<'a>(
    path: &Path,
    columns: &[String],
    rows: impl Iterator<Item = &'a Row>,
) -> Result<(), MaterializeError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(File::create(path)?));
    writer.write_record(columns)?;
    for row in rows {
        let record: Vec<String> = columns
            .iter()
            .map(|col| row.get(col).map(FieldValue::render).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_part(
    path: &Path,
    schema: &TableSchema,
    out: &mut Vec<Row>,
) -> Result<(), MaterializeError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;
    for record in reader.records() {
        let record = record?;
        let mut row = Row::new();
        for (index, column) in schema.columns.iter().enumerate() {
            let raw = record.get(index).unwrap_or_default();
            row.insert(
                column.name.clone(),
                parse_field(raw, column.semantic_type, &column.name)?,
            );
        }
        out.push(row);
    }
    Ok(())
}

fn parse_field(
    raw: &str,
    semantic_type: SemanticType,
    column: &str,
) -> Result<FieldValue, MaterializeError> {
    if raw.is_empty() {
        return Ok(FieldValue::Null);
    }
    let parsed = match semantic_type {
        SemanticType::Int => raw.parse::<i64>().ok().map(FieldValue::Int),
        SemanticType::Float => raw.parse::<f64>().ok().map(FieldValue::Float),
        SemanticType::Text => Some(FieldValue::Text(raw.to_string())),
        SemanticType::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(FieldValue::Date),
        SemanticType::Timestamp => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
            .ok()
            .map(FieldValue::Timestamp),
    };
    parsed.ok_or_else(|| {
        MaterializeError::Data(format!("cannot parse '{raw}' as {semantic_type:?} for '{column}'"))
    })
}

fn hash_value(value: &FieldValue) -> u64 {
    let rendered = value.render();
    let mut hash = 0xcbf29ce484222325_u64;
    for byte in rendered.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
