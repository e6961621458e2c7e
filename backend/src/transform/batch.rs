//! Batch processing over one column.
//!
//! [`BatchProcessor::run`] sends every cell of the resolved column through a
//! [`RowTransformer`] and returns a copy of the dataset with one result column
//! appended. Guarantees:
//!
//! - one [`TransformResult`] per input row, in input order
//! - a failed or skipped row never stops the rows after it
//! - with `concurrency > 1`, results are placed by row index, never by completion order
//! - the result column is appended only after every slot is filled

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::resolver::ColumnHandle;
use super::row::RowTransformer;
use crate::api::logs::log_progress;
use crate::error::DatasetResult;
use crate::models::{Cell, Instruction, TabularDataset, TransformResult};

/// Default header of the appended column
pub const DEFAULT_RESULT_COLUMN: &str = "Result";

/// Upper bound on calls in flight, whatever the caller asks for
pub const MAX_CONCURRENCY: usize = 32;

/// How failed rows appear in the output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureRendering {
    /// `Error: <reason>`
    #[default]
    Message,
    /// Empty cell, same as a skipped row
    Empty,
}

/// Options for a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Maximum external calls in flight (1 = strictly sequential, capped at [`MAX_CONCURRENCY`])
    pub concurrency: usize,
    /// Header of the appended column (suffixed if already taken)
    pub result_column: String,
    /// Rendering of failed rows
    pub failure_rendering: FailureRendering,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            result_column: DEFAULT_RESULT_COLUMN.to_string(),
            failure_rendering: FailureRendering::Message,
        }
    }
}

/// Receives one observation per processed row.
pub trait ProgressObserver: Send + Sync {
    fn on_row(&self, index: usize, total: usize, result: &TransformResult);
}

/// Reports progress through the log broadcaster.
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_row(&self, index: usize, total: usize, result: &TransformResult) {
        let detail = match result {
            TransformResult::Failed(reason) => Some(reason.as_str()),
            TransformResult::Skipped => Some("empty or non-text cell"),
            TransformResult::Success(_) => None,
        };
        log_progress(index, total, result.label(), detail);
    }
}

/// Discards progress.
pub struct SilentObserver;

impl ProgressObserver for SilentObserver {
    fn on_row(&self, _index: usize, _total: usize, _result: &TransformResult) {}
}

/// Counts and timing of one run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub run_id: String,
    pub started_at: String,
    pub elapsed_ms: u64,
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub column: String,
    pub result_column: String,
    pub concurrency: usize,
}

/// Output of a batch run
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Input columns plus the result column
    pub dataset: TabularDataset,
    /// One result per row, in row order
    pub results: Vec<TransformResult>,
    pub summary: BatchSummary,
}

/// Runs a [`RowTransformer`] over every row of a column.
pub struct BatchProcessor {
    transformer: RowTransformer,
    options: BatchOptions,
    observer: Arc<dyn ProgressObserver>,
}

impl BatchProcessor {
    pub fn new(transformer: RowTransformer, options: BatchOptions) -> Self {
        Self {
            transformer,
            options,
            observer: Arc::new(LogObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Process every row and return the augmented copy of `dataset`.
    pub async fn run(
        &self,
        dataset: &TabularDataset,
        column: &ColumnHandle,
        instruction: &Instruction,
    ) -> DatasetResult<BatchOutcome> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let start = Instant::now();
        let concurrency = self.options.concurrency.clamp(1, MAX_CONCURRENCY);

        let results = if concurrency == 1 {
            self.run_sequential(dataset, column, instruction).await
        } else {
            self.run_concurrent(dataset, column, instruction, concurrency).await
        };

        let cells: Vec<Cell> = results
            .iter()
            .map(|r| render_result(r, self.options.failure_rendering))
            .collect();

        let mut output = dataset.clone();
        let result_column = output.append_column(&self.options.result_column, cells)?;

        let summary = BatchSummary {
            run_id: Uuid::new_v4().to_string(),
            started_at,
            elapsed_ms: start.elapsed().as_millis() as u64,
            total: results.len(),
            succeeded: results.iter().filter(|r| r.is_success()).count(),
            skipped: results.iter().filter(|r| r.is_skipped()).count(),
            failed: results.iter().filter(|r| r.is_failed()).count(),
            column: column.name().to_string(),
            result_column,
            concurrency,
        };

        Ok(BatchOutcome {
            dataset: output,
            results,
            summary,
        })
    }

    async fn run_sequential(
        &self,
        dataset: &TabularDataset,
        column: &ColumnHandle,
        instruction: &Instruction,
    ) -> Vec<TransformResult> {
        let total = dataset.row_count();
        let mut results = Vec::with_capacity(total);

        for (index, cell) in dataset.column_cells(column.index()).enumerate() {
            let result = self.transformer.transform(cell, instruction).await;
            self.observer.on_row(index, total, &result);
            results.push(result);
        }

        results
    }

    async fn run_concurrent(
        &self,
        dataset: &TabularDataset,
        column: &ColumnHandle,
        instruction: &Instruction,
        concurrency: usize,
    ) -> Vec<TransformResult> {
        let total = dataset.row_count();
        let mut slots: Vec<Option<TransformResult>> = vec![None; total];

        // Each future owns its row so the stream stays Send inside axum handlers
        let rows: Vec<(usize, Cell)> = dataset.column_cells(column.index()).cloned().enumerate().collect();
        let mut completed = stream::iter(rows)
            .map(|(index, cell)| {
                let transformer = self.transformer.clone();
                let instruction = instruction.clone();
                async move { (index, transformer.transform(&cell, &instruction).await) }
            })
            .buffer_unordered(concurrency);

        while let Some((index, result)) = completed.next().await {
            self.observer.on_row(index, total, &result);
            slots[index] = Some(result);
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| TransformResult::Failed("row was not processed".to_string())))
            .collect()
    }
}

/// Cell written to the result column for one row.
pub fn render_result(result: &TransformResult, rendering: FailureRendering) -> Cell {
    match (result, rendering) {
        (TransformResult::Success(text), _) => Cell::Text(text.clone()),
        (TransformResult::Skipped, _) => Cell::Empty,
        (TransformResult::Failed(reason), FailureRendering::Message) => Cell::Text(format!("Error: {}", reason)),
        (TransformResult::Failed(_), FailureRendering::Empty) => Cell::Empty,
    }
}
