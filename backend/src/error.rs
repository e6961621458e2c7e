//! Error types for the Rowwise batch pipeline.
//!
//! - [`DatasetError`] - CSV loading and writing errors
//! - [`ResolveError`] - Column selector resolution errors
//! - [`PreconditionError`] - Missing run inputs, detected before any row is processed
//! - [`GenerationError`] - Failures of the external text-generation call
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP API errors
//!
//! Only precondition, resolution, loading and serialization errors abort a run.
//! A [`GenerationError`] is always absorbed into the failing row's result.

use thiserror::Error;

// =============================================================================
// Dataset Errors
// =============================================================================

/// Errors while loading or writing a tabular dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Failed to read or write a file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The raw bytes could not be decoded.
    #[error("Failed to decode content: {0}")]
    Encoding(String),

    /// Invalid CSV content.
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Empty input.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No header row.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// A row does not carry one cell per column.
    #[error("Row {row} has {found} cells, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Two columns share a header.
    #[error("Duplicate column header: {0}")]
    DuplicateColumn(String),

    /// The CSV writer failed.
    #[error("Failed to write CSV: {0}")]
    Write(String),
}

// =============================================================================
// Column Resolution Errors
// =============================================================================

/// Errors while resolving a column selector against a dataset.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// No column carries the requested header (exact, case-sensitive match).
    #[error("Column '{name}' not found (available: {})", available.join(", "))]
    ColumnNotFound { name: String, available: Vec<String> },

    /// The positional letter points past the last column.
    #[error("Column letter '{letter}' is out of range: position {position}, dataset has {column_count} columns")]
    ColumnOutOfRange {
        letter: char,
        position: usize,
        column_count: usize,
    },
}

// =============================================================================
// Precondition Errors
// =============================================================================

/// A run input is missing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreconditionError {
    /// No dataset was loaded, or it has no rows.
    #[error("No dataset loaded (or the dataset has no rows)")]
    NoDataset,

    /// No column selector was given.
    #[error("No column specified")]
    MissingColumn,

    /// No instruction was given.
    #[error("No instruction provided")]
    MissingInstruction,
}

// =============================================================================
// Generation Errors
// =============================================================================

/// Errors from the external text-generation service.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Missing API key.
    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    /// Transport-level failure.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// The call did not complete within the per-call timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The service answered with an error status.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The response body could not be understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The response carried no generated text.
    #[error("Empty response")]
    EmptyResponse,
}

impl GenerationError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::RequestFailed(_) | GenerationError::Timeout(_) => true,
            GenerationError::ApiError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// Per-row failures never appear here; they live in the row results.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A run input is missing.
    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    /// The column selector could not be resolved.
    #[error("Column error: {0}")]
    Resolve(#[from] ResolveError),

    /// The input could not be loaded.
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// The augmented dataset could not be written.
    #[error("Serialization error: {0}")]
    Serialization(#[source] DatasetError),

    /// The generator could not be configured.
    #[error("Generator error: {0}")]
    Generator(#[from] GenerationError),
}

impl PipelineError {
    /// Whether the error stems from caller input rather than the environment.
    pub fn is_user_error(&self) -> bool {
        matches!(self, PipelineError::Precondition(_) | PipelineError::Resolve(_))
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Result type for column resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Result type for generation calls.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
