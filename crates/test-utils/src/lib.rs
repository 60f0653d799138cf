//! Shared test utilities for the era5-ingester workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Scratch directories for test output
//! - Skip macro for tests that need an external service
//! - Synthetic ERA5 grid generators and NetCDF fixture writers
//! - Country boundary fixtures
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Macro to skip a test unless an environment variable is set.
///
/// Used by tests that need an external service such as PostgreSQL.
///
/// ```ignore
/// let url = test_utils::require_env!("DATABASE_URL");
/// ```
#[macro_export]
macro_rules! require_env {
    ($name:expr) => {{
        match std::env::var($name) {
            Ok(value) if !value.is_empty() => value,
            _ => {
                eprintln!("SKIPPED: environment variable '{}' not set.", $name);
                return;
            }
        }
    }};
}

/// Macro for approximate floating-point equality assertions.
///
/// ```ignore
/// assert_approx_eq!(1.0001, 1.0, 0.001);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left_val: f64 = $left as f64;
        let right_val: f64 = $right as f64;
        let eps: f64 = $epsilon as f64;
        let diff = (left_val - right_val).abs();
        if diff > eps {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{}`\n right: `{}`\n  diff: `{}`\n   eps: `{}`",
                left_val, right_val, diff, eps
            );
        }
    }};
}

/// Approximate equality for optional series values; `None` must match `None`.
#[macro_export]
macro_rules! assert_series_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: Vec<Option<f64>> = $left;
        let right: Vec<Option<f64>> = $right;
        assert_eq!(left.len(), right.len(), "series lengths differ: {:?} vs {:?}", left, right);
        for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            match (l, r) {
                (Some(l), Some(r)) => {
                    if (l - r).abs() > $epsilon {
                        panic!(
                            "series differ at {}: {} vs {} ({:?} vs {:?})",
                            i, l, r, left, right
                        );
                    }
                }
                (None, None) => {}
                _ => panic!("series differ at {}: {:?} vs {:?}", i, l, r),
            }
        }
    }};
}
