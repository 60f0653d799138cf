//! Common types shared across the ERA5 ingester crates.
//!
//! - [`BoundingBox`]: geographic request extent in CDS `area` order
//! - [`TimeWindow`] and the calendar-month chunker
//! - [`FetchBudget`]: the archive's per-request field-count cap
//! - [`CountrySeries`]: the reduced per-country output unit
//! - variable classification (instantaneous vs. accumulated flux)

pub mod bbox;
pub mod error;
pub mod series;
pub mod time;
pub mod variable;

pub use bbox::BoundingBox;
pub use error::{WindowError, WindowResult};
pub use series::{CountrySeries, Sample, StatKind};
pub use time::{
    chunk, exceeds_budget, max_days_per_request, split_to_budget, FetchBudget, TimeWindow,
};
pub use variable::classify_variable;
