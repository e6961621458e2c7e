//! Transformation module.
//!
//! This module applies one instruction to every row of one column:
//! - Resolver: column selector to column position
//! - Row: single-cell transformation with retry
//! - Batch: ordered, failure-isolated processing of a whole column
//! - Pipeline: load, resolve, batch, write

pub mod batch;
pub mod pipeline;
pub mod resolver;
pub mod row;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::*;
pub use pipeline::*;
pub use resolver::*;
pub use row::RowTransformer;
