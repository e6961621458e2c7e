//! High-level pipeline API: load a CSV, resolve the column, run the batch.
//!
//! # Example
//!
//! ```rust,ignore
//! use rowwise::transform::{run_csv, write_output, BatchOptions, BatchProcessor, RowTransformer, RunRequest};
//! use rowwise::ai::GeneratorConfig;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GeneratorConfig::from_env()?;
//!     let processor = BatchProcessor::new(RowTransformer::from_config(&config)?, BatchOptions::default());
//!     let request = RunRequest::new("B", "Summarize in five words");
//!
//!     let output = run_csv(Path::new("notes.csv"), &request, &processor, None).await?;
//!     write_output(&output.dataset, Path::new("notes_results.csv"), output.csv_info.delimiter)?;
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::batch::{BatchProcessor, BatchSummary};
use super::resolver::{ColumnHandle, ColumnSelector};
use crate::api::logs::{log_info, log_success, log_warning};
use crate::error::{PipelineError, PipelineResult, PreconditionError};
use crate::models::{Instruction, TabularDataset, TransformResult};
use crate::parser::{format_delimiter, parse_bytes, parse_csv_file_auto, parse_csv_file, write_csv_file, ParseResult};

/// Caller inputs for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    /// Positional letter or exact header name
    pub column: String,
    /// Instruction applied to every row
    pub instruction: String,
}

impl RunRequest {
    pub fn new(column: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            instruction: instruction.into(),
        }
    }

    /// Validate both inputs without touching any data.
    pub fn validate(&self) -> Result<(ColumnSelector, Instruction), PreconditionError> {
        let selector = ColumnSelector::parse(&self.column)?;
        let instruction = Instruction::new(self.instruction.as_str())?;
        Ok((selector, instruction))
    }
}

/// CSV file information
#[derive(Debug, Clone, Serialize)]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

impl CsvInfo {
    fn from_parse(parsed: &ParseResult) -> Self {
        Self {
            encoding: parsed.encoding.clone(),
            delimiter: parsed.delimiter,
            headers: parsed.headers().to_vec(),
            row_count: parsed.dataset.row_count(),
        }
    }
}

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Input columns plus the result column
    pub dataset: TabularDataset,
    /// One result per input row, in row order
    pub results: Vec<TransformResult>,
    pub summary: BatchSummary,
    /// Column the instruction was applied to
    pub column: ColumnHandle,
    /// CSV parsing metadata
    pub csv_info: CsvInfo,
}

/// Run on a CSV file. The delimiter is detected unless given.
pub async fn run_csv(
    path: &Path,
    request: &RunRequest,
    processor: &BatchProcessor,
    delimiter: Option<char>,
) -> PipelineResult<PipelineOutput> {
    let (selector, instruction) = request.validate()?;

    log_info(format!("📖 Reading {}...", path.display()));
    let parsed = match delimiter {
        Some(d) => parse_csv_file(path, d)?,
        None => parse_csv_file_auto(path)?,
    };
    run_parsed(parsed, &selector, &instruction, processor).await
}

/// Run on raw CSV bytes (uploads).
pub async fn run_bytes(
    bytes: &[u8],
    request: &RunRequest,
    processor: &BatchProcessor,
    delimiter: Option<char>,
) -> PipelineResult<PipelineOutput> {
    let (selector, instruction) = request.validate()?;

    log_info("📖 Reading uploaded CSV...");
    let parsed = parse_bytes(bytes, delimiter)?;
    run_parsed(parsed, &selector, &instruction, processor).await
}

/// Run on an already loaded dataset.
pub async fn run_dataset(
    dataset: &TabularDataset,
    request: &RunRequest,
    processor: &BatchProcessor,
) -> PipelineResult<(TabularDataset, Vec<TransformResult>, BatchSummary, ColumnHandle)> {
    let (selector, instruction) = request.validate()?;
    process(dataset, &selector, &instruction, processor).await
}

async fn run_parsed(
    parsed: ParseResult,
    selector: &ColumnSelector,
    instruction: &Instruction,
    processor: &BatchProcessor,
) -> PipelineResult<PipelineOutput> {
    log_success(format!("Detected encoding: {}", parsed.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(parsed.delimiter)));
    log_success(format!("Read {} rows", parsed.dataset.row_count()));

    let csv_info = CsvInfo::from_parse(&parsed);
    let (dataset, results, summary, column) = process(&parsed.dataset, selector, instruction, processor).await?;

    Ok(PipelineOutput {
        dataset,
        results,
        summary,
        column,
        csv_info,
    })
}

async fn process(
    dataset: &TabularDataset,
    selector: &ColumnSelector,
    instruction: &Instruction,
    processor: &BatchProcessor,
) -> PipelineResult<(TabularDataset, Vec<TransformResult>, BatchSummary, ColumnHandle)> {
    if dataset.is_empty() {
        return Err(PreconditionError::NoDataset.into());
    }

    let column = selector.resolve(dataset)?;
    log_info(format!(
        "🔄 Applying instruction to column {} \"{}\" ({} rows, concurrency {})",
        column.letter(),
        column.name(),
        dataset.row_count(),
        processor.options().concurrency.max(1)
    ));

    let outcome = processor.run(dataset, &column, instruction).await?;
    let summary = &outcome.summary;

    if summary.failed > 0 {
        log_warning(format!("{} of {} rows failed", summary.failed, summary.total));
    }
    log_success(format!(
        "Done: {} succeeded, {} skipped, {} failed ({} ms)",
        summary.succeeded, summary.skipped, summary.failed, summary.elapsed_ms
    ));

    Ok((outcome.dataset, outcome.results, outcome.summary, column))
}

/// Write the augmented dataset to `path`.
pub fn write_output(dataset: &TabularDataset, path: &Path, delimiter: char) -> PipelineResult<()> {
    write_csv_file(dataset, path, delimiter).map_err(PipelineError::Serialization)?;
    log_success(format!("💾 Results saved to {}", path.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::GeneratorConfig;
    use crate::error::ResolveError;
    use crate::transform::batch::{BatchOptions, SilentObserver};
    use crate::transform::row::RowTransformer;
    use crate::transform::testing::StubGenerator;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn processor(stub: Arc<StubGenerator>) -> BatchProcessor {
        BatchProcessor::new(RowTransformer::new(stub, &GeneratorConfig::default()), BatchOptions::default())
            .with_observer(Arc::new(SilentObserver))
    }

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_run_csv_end_to_end() {
        let input = csv_file("ID,Notes\n1,\"aspirin, ibuprofen\"\n2,\n");
        let stub = Arc::new(StubGenerator::summarizer());

        let output = run_csv(input.path(), &RunRequest::new("B", "Summarize"), &processor(stub), None)
            .await
            .unwrap();

        assert_eq!(output.column.name(), "Notes");
        assert_eq!(output.csv_info.row_count, 2);
        assert_eq!(output.csv_info.delimiter, ',');
        assert_eq!(output.summary.succeeded, 1);
        assert_eq!(output.summary.skipped, 1);

        let out_dir = tempfile::tempdir().unwrap();
        let out_path = out_dir.path().join("notes_results.csv");
        write_output(&output.dataset, &out_path, ',').unwrap();
        let written = std::fs::read_to_string(&out_path).unwrap();
        assert_eq!(
            written,
            "ID,Notes,Result\n1,\"aspirin, ibuprofen\",\"<SUMMARY:aspirin, ibuprofen>\"\n2,,\n"
        );
    }

    #[tokio::test]
    async fn test_unknown_column_makes_no_calls() {
        let stub = Arc::new(StubGenerator::summarizer());
        let err = run_bytes(
            b"Name,Comment\nx,y\n",
            &RunRequest::new("Notes", "Summarize"),
            &processor(stub.clone()),
            None,
        )
        .await
        .unwrap_err();

        match err {
            PipelineError::Resolve(ResolveError::ColumnNotFound { name, available }) => {
                assert_eq!(name, "Notes");
                assert_eq!(available, vec!["Name", "Comment"]);
            }
            other => panic!("expected ColumnNotFound, got {other:?}"),
        }
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_letter_out_of_range_makes_no_calls() {
        let stub = Arc::new(StubGenerator::summarizer());
        let err = run_bytes(
            b"A1,B1,C1\n1,2,3\n",
            &RunRequest::new("Z", "Summarize"),
            &processor(stub.clone()),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Resolve(ResolveError::ColumnOutOfRange { letter: 'Z', .. })
        ));
        assert!(err.is_user_error());
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_inputs_rejected_before_loading() {
        let stub = Arc::new(StubGenerator::summarizer());
        let p = processor(stub.clone());
        let missing = Path::new("/definitely/not/here.csv");

        let err = run_csv(missing, &RunRequest::new("B", "   "), &p, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Precondition(PreconditionError::MissingInstruction)));

        let err = run_csv(missing, &RunRequest::new("", "Summarize"), &p, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Precondition(PreconditionError::MissingColumn)));

        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_header_only_file_is_no_dataset() {
        let stub = Arc::new(StubGenerator::summarizer());
        let err = run_bytes(b"ID,Notes\n", &RunRequest::new("B", "Summarize"), &processor(stub), None)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Precondition(PreconditionError::NoDataset)));
    }

    #[tokio::test]
    async fn test_explicit_delimiter() {
        let stub = Arc::new(StubGenerator::summarizer());
        let output = run_bytes(
            b"ID;Notes\n1;hello\n",
            &RunRequest::new("Notes", "Summarize"),
            &processor(stub),
            Some(';'),
        )
        .await
        .unwrap();

        assert_eq!(output.csv_info.delimiter, ';');
        assert_eq!(output.results, vec![TransformResult::Success("<SUMMARY:hello>".into())]);
    }

    #[tokio::test]
    async fn test_run_dataset() {
        let ds = TabularDataset::from_rows(
            vec!["Notes".to_string()],
            vec![vec!["a".into()], vec!["b".into()]],
        )
        .unwrap();
        let stub = Arc::new(StubGenerator::summarizer());

        let (out, results, summary, column) = run_dataset(&ds, &RunRequest::new("A", "Summarize"), &processor(stub))
            .await
            .unwrap();

        assert_eq!(column.index(), 0);
        assert_eq!(results.len(), 2);
        assert_eq!(summary.total, 2);
        assert_eq!(out.columns(), &["Notes".to_string(), "Result".to_string()]);
    }

    #[test]
    fn test_write_output_serialization_error() {
        let ds = TabularDataset::from_rows(vec!["A".to_string()], vec![vec!["x".into()]]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let bad_path = dir.path().join("missing_dir").join("out.csv");

        let err = write_output(&ds, &bad_path, ',').unwrap_err();
        assert!(matches!(err, PipelineError::Serialization(_)));
        assert!(!err.is_user_error());
    }
}
