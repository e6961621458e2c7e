//! Domain models for the Rowwise pipeline.
//!
//! - [`Cell`] - A single dynamically typed value (text, number, empty)
//! - [`TabularDataset`] - Ordered columns and rows loaded from a tabular source
//! - [`Instruction`] - The per-run instruction text
//! - [`TransformResult`] - Outcome of transforming one row

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

use crate::error::{DatasetError, DatasetResult, PreconditionError};

// =============================================================================
// Cell
// =============================================================================

/// A single (row, column) value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    /// Missing or blank value.
    #[default]
    Empty,
    /// Free text.
    Text(String),
    /// Numeric value.
    Number(f64),
}

impl Cell {
    /// Infer a cell from a raw field.
    ///
    /// Blank fields become [`Cell::Empty`]. A field becomes [`Cell::Number`] only
    /// when it is written in canonical form (`42`, `-3.5`), so writing the cell
    /// back reproduces the input exactly. Everything else stays text, untrimmed.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        if trimmed == raw {
            if let Ok(value) = trimmed.parse::<f64>() {
                if value.is_finite() && format_number(value) == trimmed {
                    return Cell::Number(value);
                }
            }
        }
        Cell::Text(raw.to_string())
    }

    /// True for [`Cell::Empty`] and whitespace-only text.
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// The text content, if this is a non-blank text cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) if !s.trim().is_empty() => Some(s),
            _ => None,
        }
    }

    /// Render the cell as it is written to a CSV field.
    pub fn to_field(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_field())
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Empty => serializer.serialize_none(),
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Number(n) if is_integral(*n) => serializer.serialize_i64(*n as i64),
            Cell::Number(n) => serializer.serialize_f64(*n),
        }
    }
}

fn is_integral(value: f64) -> bool {
    value.fract() == 0.0 && value.abs() < 1e15
}

/// Integral values print without a fractional part.
fn format_number(value: f64) -> String {
    if is_integral(value) {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

// =============================================================================
// Tabular Dataset
// =============================================================================

/// In-memory table: ordered column headers and rows of equal width.
///
/// Row order is insertion order. The only mutation after loading is
/// [`TabularDataset::append_column`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabularDataset {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl TabularDataset {
    /// Create an empty dataset with the given headers.
    pub fn new(columns: Vec<String>) -> DatasetResult<Self> {
        if columns.is_empty() {
            return Err(DatasetError::NoHeaders);
        }
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(DatasetError::DuplicateColumn(column.clone()));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Create a dataset from headers and rows.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> DatasetResult<Self> {
        let mut dataset = Self::new(columns)?;
        for row in rows {
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    /// Append a row. It must carry one cell per column.
    pub fn push_row(&mut self, row: Vec<Cell>) -> DatasetResult<()> {
        if row.len() != self.columns.len() {
            return Err(DatasetError::RowWidth {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a header (exact match).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Cells of one column in row order.
    pub fn column_cells(&self, column: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().map(move |r| r.get(column).unwrap_or(&Cell::Empty))
    }

    /// First free header derived from `base`: `base`, then `base_2`, `base_3`, ...
    pub fn unique_column_name(&self, base: &str) -> String {
        if self.column_index(base).is_none() {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| self.column_index(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    /// Append a column holding one cell per row.
    ///
    /// Nothing is modified unless `cells` has exactly one entry per row.
    /// Returns the header actually used (see [`Self::unique_column_name`]).
    pub fn append_column(&mut self, name: &str, cells: Vec<Cell>) -> DatasetResult<String> {
        if cells.len() != self.rows.len() {
            return Err(DatasetError::RowWidth {
                row: self.rows.len().min(cells.len()),
                expected: self.rows.len(),
                found: cells.len(),
            });
        }
        let header = self.unique_column_name(name);
        self.columns.push(header.clone());
        for (row, cell) in self.rows.iter_mut().zip(cells) {
            row.push(cell);
        }
        Ok(header)
    }

    /// Rows as JSON objects keyed by header.
    pub fn to_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut obj = Map::new();
                for (header, cell) in self.columns.iter().zip(row) {
                    obj.insert(
                        header.clone(),
                        serde_json::to_value(cell).unwrap_or(Value::Null),
                    );
                }
                Value::Object(obj)
            })
            .collect()
    }
}

// =============================================================================
// Instruction
// =============================================================================

/// The instruction applied to every row of a run. Kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Instruction(String);

impl Instruction {
    /// Wrap user input. Blank input is rejected; anything else is kept as typed.
    pub fn new(text: impl Into<String>) -> Result<Self, PreconditionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(PreconditionError::MissingInstruction);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Transform Result
// =============================================================================

/// Outcome of transforming one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum TransformResult {
    /// Generated text.
    Success(String),
    /// The cell was empty or not text; the service was not called.
    Skipped,
    /// The external call failed; the reason is kept as data.
    Failed(String),
}

impl TransformResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TransformResult::Success(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TransformResult::Skipped)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TransformResult::Failed(_))
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            TransformResult::Success(_) => "success",
            TransformResult::Skipped => "skipped",
            TransformResult::Failed(_) => "failed",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
