//! Column selection.
//!
//! A user types either a single letter (`B`, spreadsheet style) or a header
//! name (`Notes`). The selector is parsed once into a [`ColumnSelector`] and
//! resolved once per run into an immutable [`ColumnHandle`].

use serde::Serialize;
use std::fmt;

use crate::error::{PreconditionError, ResolveError, ResolveResult};
use crate::models::TabularDataset;

/// A parsed column selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    /// Single alphabetic character: `A` is the first column. Case-insensitive.
    /// Letters past `Z` (`é`, `Ω`) are positional too and never name a column.
    Positional(char),
    /// Exact, case-sensitive header name.
    Named(String),
}

impl ColumnSelector {
    /// Parse user input. Surrounding whitespace is ignored; blank input is an error.
    pub fn parse(input: &str) -> Result<Self, PreconditionError> {
        let input = input.trim();
        let mut chars = input.chars();
        match (chars.next(), chars.next()) {
            (None, _) => Err(PreconditionError::MissingColumn),
            (Some(c), None) if c.is_alphabetic() => Ok(Self::Positional(uppercase(c))),
            _ => Ok(Self::Named(input.to_string())),
        }
    }

    /// Resolve against the dataset's current column order.
    pub fn resolve(&self, dataset: &TabularDataset) -> ResolveResult<ColumnHandle> {
        resolve_column(self, dataset)
    }
}

fn uppercase(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSelector::Positional(c) => write!(f, "column {}", c),
            ColumnSelector::Named(name) => write!(f, "'{}'", name),
        }
    }
}

/// A resolved column: position plus the header found there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnHandle {
    index: usize,
    name: String,
}

impl ColumnHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spreadsheet letter for this position (`A`, ..., `Z`, `AA`, ...).
    pub fn letter(&self) -> String {
        column_letter(self.index)
    }
}

/// Map a selector to a column of `dataset`.
pub fn resolve_column(selector: &ColumnSelector, dataset: &TabularDataset) -> ResolveResult<ColumnHandle> {
    let columns = dataset.columns();
    match selector {
        ColumnSelector::Positional(letter) => {
            let letter = uppercase(*letter);
            let position = (letter as u32).saturating_sub('A' as u32) as usize;
            // Only A-Z map onto real columns
            columns
                .get(position)
                .filter(|_| letter.is_ascii_uppercase())
                .map(|name| ColumnHandle {
                    index: position,
                    name: name.clone(),
                })
                .ok_or(ResolveError::ColumnOutOfRange {
                    letter,
                    position,
                    column_count: columns.len(),
                })
        }
        ColumnSelector::Named(name) => dataset
            .column_index(name)
            .map(|index| ColumnHandle {
                index,
                name: name.clone(),
            })
            .ok_or_else(|| ResolveError::ColumnNotFound {
                name: name.clone(),
                available: columns.to_vec(),
            }),
    }
}

/// Spreadsheet-style letter for a zero-based column position.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}
