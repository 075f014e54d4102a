//! Error types for geocorr

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeocorrError {
    // Schema errors
    #[error("Schema error in table '{table}': missing required field '{field}'")]
    Schema { table: String, field: String },

    #[error("Invalid value in table '{table}' row {row}, field '{field}': {reason}")]
    InvalidValue {
        table: String,
        row: usize,
        field: String,
        reason: String,
    },

    // Geometry errors
    #[error("Degenerate geometry for survey line '{line_id}': {reason}")]
    DegenerateGeometry { line_id: String, reason: String },

    // Cache errors
    #[error("Cache entry {key} failed integrity check: {reason}")]
    CacheCorruption { key: String, reason: String },

    // Execution errors
    #[error("Stage '{stage}' timed out after {seconds}s")]
    Timeout { stage: String, seconds: u64 },

    #[error("Task for '{task}' failed: {reason}")]
    TaskFailed { task: String, reason: String },

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GeocorrError {
    fn from(err: serde_json::Error) -> Self {
        GeocorrError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GeocorrError>;
