use thiserror::Error;

/// Startup and per-table configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file missing on disk.
    #[error("configuration file not found: {0}")]
    NotFound(String),
    /// A required section or key is missing or has an invalid value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Storage kind outside the supported set (S3, ADLS).
    #[error("unsupported storage kind: {0}")]
    UnsupportedStorage(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failures resolving a table name to its column schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("missing schema definition for table '{table}' at {path}")]
    Missing { table: String, path: String },
    #[error("malformed schema for table '{table}': {source}")]
    Malformed {
        table: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
