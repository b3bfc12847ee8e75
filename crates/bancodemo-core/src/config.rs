use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Per-table materialization settings, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub num_records: u64,
    pub partitioned: bool,
    pub bucketed: bool,
    /// Bucket count; only meaningful when `bucketed` is set.
    pub num_buckets: u32,
    /// Natural key column used for bucketed layouts.
    pub clustered_by: String,
}

/// Storage backend named in the `[storage]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    S3,
    Adls,
}

impl StorageKind {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "S3" => Ok(StorageKind::S3),
            "ADLS" => Ok(StorageKind::Adls),
            other => Err(ConfigError::UnsupportedStorage(other.to_string())),
        }
    }
}

/// Global storage settings, one per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub kind: StorageKind,
    pub base_path: String,
}

/// Where materialized tables land for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    /// Managed tables registered under a database in the catalog.
    Catalog { database: String },
    /// Raw files written under a base path, no catalog registration.
    FlatFile { base_path: String, format: String },
}

/// Typed, eagerly-validated view over the run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Write raw files instead of managed tables.
    pub file_only: bool,
    /// File format for flat-file writes. Managed tables ignore this.
    pub file_format: String,
    pub database: String,
    /// Tables in configured processing order.
    pub tables: Vec<TableSpec>,
    pub storage: StorageSettings,
}

const DEFAULT_FILE_FORMAT: &str = "parquet";
const DEFAULT_DATABASE: &str = "bancodemo";
const DEFAULT_CLUSTERED_BY: &str = "id_usuario";

impl RunConfig {
    /// Load and validate the configuration file. Missing required keys fail
    /// here rather than during table processing.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents)?;

        let defaults = raw.default.unwrap_or_default();
        let table_names = defaults
            .tabelas
            .as_deref()
            .map(split_table_list)
            .unwrap_or_default();
        if table_names.is_empty() {
            return Err(ConfigError::Invalid(
                "default.tabelas must list at least one table".to_string(),
            ));
        }

        let storage = raw.storage.ok_or_else(|| {
            ConfigError::Invalid("missing [storage] section".to_string())
        })?;
        let storage_type = storage.storage_type.ok_or_else(|| {
            ConfigError::Invalid("storage.storage_type is required".to_string())
        })?;
        let kind = StorageKind::parse(&storage_type)?;
        let base_path = storage.base_path.ok_or_else(|| {
            ConfigError::Invalid("storage.base_path is required".to_string())
        })?;
        if base_path.is_empty() {
            return Err(ConfigError::Invalid(
                "storage.base_path must not be empty".to_string(),
            ));
        }

        let mut tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            let section = raw.tables.get(&name).ok_or_else(|| {
                ConfigError::Invalid(format!("missing [tables.{name}] section"))
            })?;
            tables.push(validate_table(&name, section)?);
        }

        Ok(Self {
            file_only: defaults.apenas_arquivos.unwrap_or(false),
            file_format: defaults
                .formato_arquivo
                .unwrap_or_else(|| DEFAULT_FILE_FORMAT.to_string()),
            database: defaults
                .dbname
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            tables,
            storage: StorageSettings {
                kind,
                base_path,
            },
        })
    }

    /// Resolve the storage target for this run.
    pub fn target(&self) -> StorageTarget {
        if self.file_only {
            StorageTarget::FlatFile {
                base_path: self.storage.base_path.clone(),
                format: self.file_format.clone(),
            }
        } else {
            StorageTarget::Catalog {
                database: self.database.clone(),
            }
        }
    }
}

fn split_table_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn validate_table(name: &str, raw: &RawTable) -> Result<TableSpec, ConfigError> {
    let num_records = raw.num_records.ok_or_else(|| {
        ConfigError::Invalid(format!("tables.{name}.num_records is required"))
    })?;
    let bucketed = raw.bucketing.unwrap_or(false);
    let num_buckets = raw.num_buckets.unwrap_or(0);
    if bucketed && num_buckets == 0 {
        return Err(ConfigError::Invalid(format!(
            "tables.{name}.num_buckets must be > 0 when bucketing is enabled"
        )));
    }

    Ok(TableSpec {
        name: name.to_string(),
        num_records,
        partitioned: raw.particionamento.unwrap_or(false),
        bucketed,
        num_buckets,
        clustered_by: raw
            .clustered_by
            .clone()
            .unwrap_or_else(|| DEFAULT_CLUSTERED_BY.to_string()),
    })
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    default: Option<RawDefaults>,
    #[serde(default)]
    tables: BTreeMap<String, RawTable>,
    storage: Option<RawStorage>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDefaults {
    apenas_arquivos: Option<bool>,
    formato_arquivo: Option<String>,
    dbname: Option<String>,
    tabelas: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    num_records: Option<u64>,
    particionamento: Option<bool>,
    bucketing: Option<bool>,
    num_buckets: Option<u32>,
    clustered_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStorage {
    storage_type: Option<String>,
    base_path: Option<String>,
}
