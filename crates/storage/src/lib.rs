//! Persistence for reduced country series.
//!
//! Provides one interface, [`SeriesStore`], with two backends:
//! - PostgreSQL via sqlx ([`PgSeriesStore`])
//! - an in-process map for tests and dry runs ([`MemorySeriesStore`])

pub mod catalog;
pub mod error;
pub mod memory;
pub mod series;

pub use catalog::PgSeriesStore;
pub use error::{StorageError, StorageResult};
pub use memory::MemorySeriesStore;
pub use series::{stored_bounds, SeriesStore};
