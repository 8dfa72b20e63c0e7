//! Error types for the seroscreen pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, SeroError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum SeroError {
    /// A required column is missing from a table
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Not enough rows (or class members) for the requested operation
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Artifact is unreadable or does not match the rows supplied to it
    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Empty file: {0}")]
    EmptyFile(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<polars::error::PolarsError> for SeroError {
    fn from(err: polars::error::PolarsError) -> Self {
        SeroError::DataError(err.to_string())
    }
}

impl From<rusqlite::Error> for SeroError {
    fn from(err: rusqlite::Error) -> Self {
        SeroError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for SeroError {
    fn from(err: serde_json::Error) -> Self {
        SeroError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for SeroError {
    fn from(err: ndarray::ShapeError) -> Self {
        SeroError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
