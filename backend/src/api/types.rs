//! REST API types for frontend integration.
//!
//! The augmented CSV is returned inline together with the per-row results,
//! so a client can show row outcomes and offer the file for download.

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::DatasetError;
use crate::models::TransformResult;
use crate::parser::to_csv_string;
use crate::transform::batch::BatchSummary;
use crate::transform::pipeline::PipelineOutput;
use crate::transform::resolver::ColumnHandle;

/// Response sent to frontend after a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready" (no failed rows), "warning" (some rows failed)
    pub status: String,

    /// Augmented dataset as CSV, in the input's delimiter
    pub csv: String,

    /// One entry per input row, in row order
    pub results: Vec<TransformResult>,

    /// Column the instruction was applied to
    pub column: ColumnHandle,

    /// Run counts and timing
    pub summary: BatchSummary,

    /// CSV info
    pub csv_info: CsvMetadata,
}

/// CSV file metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl TryFrom<PipelineOutput> for RunResponse {
    type Error = DatasetError;

    fn try_from(output: PipelineOutput) -> Result<Self, Self::Error> {
        let csv = to_csv_string(&output.dataset, output.csv_info.delimiter)?;
        let status = if output.summary.failed == 0 { "ready" } else { "warning" };

        Ok(RunResponse {
            job_id: output.summary.run_id.clone(),
            status: status.to_string(),
            csv,
            results: output.results,
            column: output.column,
            summary: output.summary,
            csv_info: CsvMetadata {
                encoding: output.csv_info.encoding,
                delimiter: output.csv_info.delimiter.to_string(),
                row_count: output.csv_info.row_count,
                columns: output.csv_info.headers,
            },
        })
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "csv": null,
        "results": [],
    })
}
