//! Error types for the reference-price extractor.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the reference-price extractor.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required column is missing from the input table.
    #[error("Schema error: required column '{column}' not found")]
    Schema { column: String },

    /// A column does not have as many cells as the rest of the table.
    #[error("Schema error: column '{column}' has {actual} rows, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// A single cell failed to parse or has the wrong type.
    ///
    /// Recoverable: the pipeline downgrades it to an absent field.
    #[error("Data quality error at row {row}, column '{column}': {message}")]
    DataQuality {
        row: usize,
        column: String,
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a missing-column error.
    pub fn schema(column: impl Into<String>) -> Self {
        Error::Schema {
            column: column.into(),
        }
    }

    /// Create a data quality error.
    pub fn data_quality(row: usize, column: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::DataQuality {
            row,
            column: column.into(),
            message: msg.into(),
        }
    }

    /// Whether this error is fatal for a whole run.
    ///
    /// Data quality errors are local to a single field.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::DataQuality { .. })
    }
}
