//! Dominance counting and the pieces needed to run it in parallel.
//!
//! - `cdf`: the empirical joint CDF/CCDF over one or more columns
//! - `ranges`: splitting a row count into ordered index ranges
//! - `parallel`: evaluating a pure function over ranges on the blocking pool
//! - `computed`: the immutable, value-sorted result type

mod cdf;
mod computed;
pub mod parallel;
mod ranges;

pub use cdf::compute_cdf;
pub use computed::{ComputationKind, ComputedData};
pub use ranges::{partition_to_ranges, Range};

/// Errors raised while computing distributions.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ComputeError {
    #[error("At least one column is required")]
    NoColumns,

    #[error("Column '{0}' has no data")]
    EmptyColumn(String),

    #[error("Column '{name}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Column '{name}' does not describe the same entities (row {row}: '{found}' vs '{expected}')")]
    IdMismatch {
        name: String,
        row: usize,
        expected: String,
        found: String,
    },

    #[error("Range [{offset}, {end}) is outside [0, {len})")]
    OutOfRange { offset: usize, end: usize, len: usize },

    #[error("Cannot partition into zero ranges")]
    ZeroPartitions,

    #[error("Computation task failed: {0}")]
    TaskFailed(String),
}

pub type ComputeResult<T> = Result<T, ComputeError>;
