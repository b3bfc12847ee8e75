use thiserror::Error;

use bancodemo_core::{ConfigError, SchemaError};

/// Errors raised while materializing or reconciling tables.
///
/// `Config` and `Schema` are fatal to the affected table only when raised
/// inside the main loop; the caller decides run-level fatality.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    /// Generator contract violation or undefined data operation.
    #[error("data error: {0}")]
    Data(String),
    /// The sink rejected or could not complete a write.
    #[error("write error: {0}")]
    Write(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
