//! # Rowwise - apply one AI instruction to every row of a CSV column
//!
//! Rowwise reads a CSV file, picks one column (by letter or header name),
//! sends each cell with a user instruction to a chat-completions service and
//! writes the table back with one appended result column.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│    Batch    │────▶│  CSV + new  │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │ (AI per row)│     │   column    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rowwise::{run_csv, BatchOptions, BatchProcessor, GeneratorConfig, RowTransformer, RunRequest};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = GeneratorConfig::from_env().unwrap();
//!     let processor = BatchProcessor::new(RowTransformer::from_config(&config).unwrap(), BatchOptions::default());
//!     let request = RunRequest::new("B", "Summarize in five words");
//!     let output = run_csv(Path::new("notes.csv"), &request, &processor, None).await.unwrap();
//!     println!("{} rows processed", output.summary.total);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Domain models (TabularDataset, Cell, Instruction, TransformResult)
//! - [`parser`] - CSV reading and writing with auto-detection
//! - [`transform`] - Column resolution, row transformation, batch and pipeline
//! - [`ai`] - Chat-completions client
//! - [`api`] - HTTP API server and log streaming

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// AI
pub mod ai;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    DatasetError,
    ResolveError,
    PreconditionError,
    GenerationError,
    PipelineError,
    ServerError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{Cell, Instruction, TabularDataset, TransformResult};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    parse_csv,
    parse_csv_file,
    parse_csv_file_auto,
    parse_bytes,
    parse_bytes_auto,
    detect_encoding,
    detect_delimiter,
    decode_content,
    write_csv,
    write_csv_file,
    to_csv_string,
    ParseResult,
};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::resolver::{column_letter, resolve_column, ColumnHandle, ColumnSelector};
pub use transform::row::RowTransformer;
pub use transform::batch::{
    BatchOptions,
    BatchOutcome,
    BatchProcessor,
    BatchSummary,
    FailureRendering,
    LogObserver,
    ProgressObserver,
    SilentObserver,
    DEFAULT_RESULT_COLUMN,
    MAX_CONCURRENCY,
};

// =============================================================================
// Re-exports - AI Client
// =============================================================================

pub use ai::{ChatClient, GenerationRequest, GeneratorConfig, TextGenerator};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    run_csv,
    run_bytes,
    run_dataset,
    write_output,
    RunRequest,
    PipelineOutput,
    CsvInfo,
};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{RunResponse, CsvMetadata, error_response};

// Server
pub mod server {
    pub use crate::api::server::{router, router_with, start_server, TransformerFactory};
}
