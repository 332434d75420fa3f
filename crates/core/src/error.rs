//! Error types for PDF to PNG conversion.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the pdf-to-png library.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// The source document is missing, unreadable or not a valid PDF.
    #[error("Failed to open document '{path}': {message}")]
    DocumentOpen { path: PathBuf, message: String },

    /// A single page could not be rasterized.
    #[error("Failed to rasterize page {page}: {message}")]
    Rasterization { page: usize, message: String },

    /// A rendered page could not be written to disk.
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    PngEncoding(String),

    /// The output root cannot be used at all; the whole run is aborted.
    #[error("Output root '{path}' is unusable: {message}")]
    JobFatal { path: PathBuf, message: String },

    /// A job was started without any input documents.
    #[error("No input documents were supplied")]
    EmptyBatch,

    /// Requested resolution is outside the supported range.
    #[error("DPI {dpi} is out of range ({min}-{max})", min = crate::config::MIN_DPI, max = crate::config::MAX_DPI)]
    InvalidDpi { dpi: u32 },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Pdfium library error.
    #[error("Pdfium error: {0}")]
    Pdfium(String),

    /// Work was not started because the job was cancelled.
    #[error("Conversion cancelled")]
    Cancelled,

    /// Worker thread panicked or was torn down.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, ConversionError>;

/// Classification of a per-page or per-document failure, as recorded in outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DocumentOpen,
    Rasterization,
    Write,
    Cancelled,
    JobFatal,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::DocumentOpen => "DocumentOpenError",
            ErrorKind::Rasterization => "RasterizationError",
            ErrorKind::Write => "WriteError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::JobFatal => "JobFatalError",
            ErrorKind::Other => "Error",
        };
        f.write_str(name)
    }
}

impl ConversionError {
    /// Classify this error for outcome reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::DocumentOpen { .. } => ErrorKind::DocumentOpen,
            ConversionError::Rasterization { .. } => ErrorKind::Rasterization,
            // An encoder failure means the page never materialized on disk.
            ConversionError::Write { .. } | ConversionError::PngEncoding(_) => ErrorKind::Write,
            ConversionError::JobFatal { .. } => ErrorKind::JobFatal,
            ConversionError::Cancelled => ErrorKind::Cancelled,
            ConversionError::EmptyBatch
            | ConversionError::InvalidDpi { .. }
            | ConversionError::InvalidConfig(_)
            | ConversionError::Pdfium(_)
            | ConversionError::Internal(_) => ErrorKind::Other,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConversionError::Write {
            path: path.into(),
            source,
        }
    }
}

impl From<png::EncodingError> for ConversionError {
    fn from(e: png::EncodingError) -> Self {
        ConversionError::PngEncoding(e.to_string())
    }
}
