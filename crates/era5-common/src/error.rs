//! Errors raised while building request windows.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias using WindowError.
pub type WindowResult<T> = Result<T, WindowError>;

/// Errors for time-window construction and chunking.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("Invalid range: end {end} is before start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Window {start}..={end} spans more than one calendar month")]
    CrossesMonth { start: NaiveDate, end: NaiveDate },

    #[error("Field limit {field_limit} cannot fit a single day of {variable_count} variables")]
    BudgetTooSmall {
        variable_count: usize,
        field_limit: usize,
    },
}
