//! Error types for drift-model
//!
//! Every variant names the stage and the column, fold or field involved so a
//! failed training run can be diagnosed from the message alone.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// drift-model error types
#[derive(Error, Debug)]
pub enum Error {
    /// Required features absent from the assembled input tables
    #[error("Schema mismatch: required features missing from input: {}", missing.join(", "))]
    SchemaMismatch {
        /// Missing feature names, in required order
        missing: Vec<String>,
    },

    /// A named column is not present in a table
    #[error("Column not found: {0}")]
    MissingColumn(String),

    /// A column holds no valid (non-missing) values
    #[error("Column '{0}' has no valid values")]
    EmptyColumn(String),

    /// Quantile labeling produced a single class
    #[error("Degenerate label: threshold {threshold} yields only class {class} ({count} rows)\nThe source distribution cannot be fixed by retraining")]
    DegenerateLabel {
        /// Quantile threshold that was applied
        threshold: f64,
        /// The only class present
        class: u8,
        /// Number of rows
        count: usize,
    },

    /// A stratified fold has no members of a class
    #[error("Empty fold: fold {fold} has no examples of class {class}\nReduce the fold count or add minority examples")]
    EmptyFold {
        /// Fold index
        fold: usize,
        /// Missing class
        class: u8,
    },

    /// Minority class too small to synthesize from
    #[error("Insufficient minority examples for oversampling: {0}")]
    InsufficientMinority(String),

    /// Matrix still contains missing values where numeric data is required
    #[error("Missing values present in {stage}: {count} NaN cells")]
    MissingValues {
        /// Stage that rejected the matrix
        stage: String,
        /// Number of NaN cells
        count: usize,
    },

    /// Matrix or vector dimensions disagree
    #[error("Shape mismatch in {stage}: expected {expected}, got {found}")]
    ShapeMismatch {
        /// Stage that detected the mismatch
        stage: String,
        /// Expected size
        expected: usize,
        /// Actual size
        found: usize,
    },

    /// Multi-source merge failed
    #[error("Join error: {0}")]
    JoinError(String),

    /// Configuration rejected at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid argument to an operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Artifact feature schema differs from the expected one
    #[error("Artifact schema mismatch\nexpected: [{}]\nfound:    [{}]", expected.join(", "), found.join(", "))]
    ArtifactSchemaMismatch {
        /// Frozen schema the consumer expects
        expected: Vec<String>,
        /// Schema stored in the artifact
        found: Vec<String>,
    },

    /// Artifact written by an incompatible format version
    #[error("Artifact format version {found} is not supported (expected {expected})")]
    ArtifactVersion {
        /// Supported version
        expected: u32,
        /// Version found in the artifact
        found: u32,
    },

    /// Scoring request lacks a schema field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Scoring request carries a field outside the schema
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Scoring request field is not numeric
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidField {
        /// Field name
        field: String,
        /// What was wrong
        reason: String,
    },

    /// Storage error (Parquet/Arrow)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON (artifact, config, scoring payload) error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
