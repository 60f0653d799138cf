//! The series store interface.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use era5_common::{CountrySeries, StatKind};

use crate::error::StorageResult;

/// Durable home for reduced series.
///
/// Rows are keyed by `(variable, country_code, valid_time)`. Writing the
/// same series twice leaves the store unchanged.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Insert or overwrite every present sample of `series`.
    ///
    /// Missing samples are skipped. Returns the number of rows written.
    async fn upsert(&self, series: &CountrySeries) -> StorageResult<usize>;

    /// Read the hours `[start, end]` of one series back, ordered by time.
    ///
    /// For integrated-flux series the stored timestamps are interval ends,
    /// so the hour starting at `start` is the row stamped `start + 1h`.
    async fn fetch(
        &self,
        variable: &str,
        country_code: &str,
        stat_kind: StatKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<CountrySeries>;
}

/// Inclusive bounds on stored `valid_time` covering the hours `[start, end]`.
pub fn stored_bounds(
    stat_kind: StatKind,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    match stat_kind {
        StatKind::Instant => (start, end),
        StatKind::IntegratedFlux => {
            let interval = Duration::seconds(CountrySeries::INTERVAL_SECONDS as i64);
            (start + interval, end + interval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_flux_bounds_shift_by_one_interval() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();

        assert_eq!(stored_bounds(StatKind::Instant, start, end), (start, end));

        let (lo, hi) = stored_bounds(StatKind::IntegratedFlux, start, end);
        assert_eq!(lo, Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap());
        assert_eq!(hi, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }
}
