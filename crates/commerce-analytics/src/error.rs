//! Analytics error types.

use std::path::PathBuf;

use thiserror::Error;

/// Analytics errors.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// DuckDB error
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(String),

    /// Data conversion error
    #[error("Data conversion error: {0}")]
    Conversion(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Input file missing from the dataset directory
    #[error("Missing input file: {}", .0.display())]
    MissingInput(PathBuf),
}

/// Result type for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;
