//! Error types for rainband

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for rainband operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Cannot parse {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    #[error("Destination already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("CRS mismatch: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    #[error("Projection error: {0}")]
    Projection(String),

    #[error("Invalid classification table: {0}")]
    InvalidClassification(String),

    #[error("Area requires a linear CRS unit, but {0} uses angular units")]
    NonLinearUnit(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Format`] tied to a path
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for rainband operations
pub type Result<T> = std::result::Result<T, Error>;
