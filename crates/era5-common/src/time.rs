//! Request windows for the reanalysis archive.
//!
//! The archive only accepts requests inside one calendar month, and caps the
//! number of fields (variables x days x hours) per request. [`chunk`] produces
//! month-aligned windows; [`split_to_budget`] splits them further when the
//! field count would exceed a [`FetchBudget`].

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{WindowError, WindowResult};

/// Hourly time steps requested per day.
pub const HOURS_PER_DAY: usize = 24;

/// A contiguous, inclusive range of calendar days inside a single month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl TimeWindow {
    /// Create a window, rejecting reversed ranges and ranges that leave the month.
    pub fn new(start: NaiveDate, end: NaiveDate) -> WindowResult<Self> {
        if end < start {
            return Err(WindowError::InvalidRange { start, end });
        }
        if start.year() != end.year() || start.month() != end.month() {
            return Err(WindowError::CrossesMonth { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days covered, both ends inclusive.
    pub fn days(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }

    /// Whether the window covers its whole calendar month.
    pub fn is_full_month(&self) -> bool {
        self.start.day() == 1 && self.end == last_day_of_month(self.start)
    }

    /// Stable identifier used for task tracing and artifact file names.
    ///
    /// Whole months map to `era5_<YYYY>_<MM>`; partial months carry their
    /// day span as well so sub-month splits never collide.
    pub fn identifier(&self) -> String {
        if self.is_full_month() {
            format!("era5_{}_{:02}", self.start.year(), self.start.month())
        } else {
            format!(
                "era5_{}_{:02}_{:02}_{:02}",
                self.start.year(),
                self.start.month(),
                self.start.day(),
                self.end.day()
            )
        }
    }

    /// Archive `year` field.
    pub fn year(&self) -> String {
        self.start.year().to_string()
    }

    /// Archive `month` field, zero padded.
    pub fn month(&self) -> String {
        format!("{:02}", self.start.month())
    }

    /// Archive `day` field: every day of the window, zero padded.
    pub fn day_list(&self) -> Vec<String> {
        (self.start.day()..=self.end.day())
            .map(|d| format!("{:02}", d))
            .collect()
    }

    /// Archive `time` field: `"00:00"` through `"23:00"`.
    pub fn hour_list() -> Vec<String> {
        (0..HOURS_PER_DAY).map(|h| format!("{:02}:00", h)).collect()
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Per-request size limits of the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchBudget {
    pub variable_count: usize,
    pub field_limit: usize,
}

impl FetchBudget {
    pub fn new(variable_count: usize, field_limit: usize) -> Self {
        Self {
            variable_count,
            field_limit,
        }
    }

    /// Fields requested by a window under this budget's variable count.
    pub fn field_count(&self, window: &TimeWindow) -> usize {
        self.variable_count * window.days() * HOURS_PER_DAY
    }
}

/// Split `[start, end]` into windows that never cross a calendar month.
///
/// Windows are contiguous, non-overlapping and cover exactly the input range.
pub fn chunk(start: NaiveDate, end: NaiveDate) -> WindowResult<Vec<TimeWindow>> {
    if end < start {
        return Err(WindowError::InvalidRange { start, end });
    }

    let mut windows = Vec::new();
    let mut cursor = start;

    while cursor <= end {
        let window_end = last_day_of_month(cursor).min(end);
        windows.push(TimeWindow {
            start: cursor,
            end: window_end,
        });

        match window_end.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }

    Ok(windows)
}

/// Whether a window requests more fields than the budget allows.
pub fn exceeds_budget(window: &TimeWindow, budget: &FetchBudget) -> bool {
    budget.field_count(window) > budget.field_limit
}

/// Largest number of days a single request may cover under `budget`.
pub fn max_days_per_request(budget: &FetchBudget) -> WindowResult<usize> {
    let fields_per_day = budget.variable_count.max(1) * HOURS_PER_DAY;
    let days = budget.field_limit / fields_per_day;
    if days == 0 {
        return Err(WindowError::BudgetTooSmall {
            variable_count: budget.variable_count,
            field_limit: budget.field_limit,
        });
    }
    Ok(days)
}

/// Split every over-budget window into consecutive sub-windows.
///
/// Windows already inside the budget are returned unchanged; order and
/// coverage are preserved.
pub fn split_to_budget(
    windows: Vec<TimeWindow>,
    budget: &FetchBudget,
) -> WindowResult<Vec<TimeWindow>> {
    let mut result = Vec::with_capacity(windows.len());

    for window in windows {
        if !exceeds_budget(&window, budget) {
            result.push(window);
            continue;
        }

        let max_days = max_days_per_request(budget)? as i64;
        let mut cursor = window.start;
        while cursor <= window.end {
            let sub_end = (cursor + Duration::days(max_days - 1)).min(window.end);
            result.push(TimeWindow {
                start: cursor,
                end: sub_end,
            });
            match sub_end.succ_opt() {
                Some(next) => cursor = next,
                None => break,
            }
        }
    }

    Ok(result)
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn assert_covers(windows: &[TimeWindow], start: NaiveDate, end: NaiveDate) {
        assert_eq!(windows.first().unwrap().start(), start);
        assert_eq!(windows.last().unwrap().end(), end);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end().succ_opt().unwrap(), pair[1].start());
        }
        for w in windows {
            assert!(w.start() <= w.end());
            assert_eq!(w.start().month(), w.end().month());
            assert_eq!(w.start().year(), w.end().year());
        }
    }

    #[test]
    fn test_single_day() {
        let windows = chunk(date(2025, 1, 1), date(2025, 1, 1)).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start(), date(2025, 1, 1));
        assert_eq!(windows[0].end(), date(2025, 1, 1));
        assert_eq!(windows[0].days(), 1);
    }

    #[test]
    fn test_three_months() {
        let windows = chunk(date(2025, 1, 1), date(2025, 3, 30)).unwrap();
        assert_eq!(
            windows,
            vec![
                TimeWindow::new(date(2025, 1, 1), date(2025, 1, 31)).unwrap(),
                TimeWindow::new(date(2025, 2, 1), date(2025, 2, 28)).unwrap(),
                TimeWindow::new(date(2025, 3, 1), date(2025, 3, 30)).unwrap(),
            ]
        );
    }

    #[test]
    fn test_year_boundary_and_leap_year() {
        let windows = chunk(date(2023, 12, 15), date(2024, 2, 29)).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].end(), date(2023, 12, 31));
        assert_eq!(windows[2].days(), 29);
        assert_covers(&windows, date(2023, 12, 15), date(2024, 2, 29));
    }

    #[test]
    fn test_coverage_over_many_ranges() {
        let starts = [date(2020, 1, 31), date(2021, 6, 15), date(2024, 2, 1)];
        for start in starts {
            for span in [0i64, 1, 27, 28, 29, 30, 31, 45, 200, 400] {
                let end = start + Duration::days(span);
                let windows = chunk(start, end).unwrap();
                assert_covers(&windows, start, end);
                let total: usize = windows.iter().map(TimeWindow::days).sum();
                assert_eq!(total as i64, span + 1);
            }
        }
    }

    #[test]
    fn test_reversed_range_is_invalid() {
        let err = chunk(date(2025, 4, 5), date(2025, 4, 4)).unwrap_err();
        assert!(matches!(err, WindowError::InvalidRange { .. }));
    }

    #[test]
    fn test_window_rejects_month_crossing() {
        let err = TimeWindow::new(date(2025, 5, 1), date(2025, 8, 1)).unwrap_err();
        assert!(matches!(err, WindowError::CrossesMonth { .. }));
    }

    #[test]
    fn test_request_fields() {
        let window = TimeWindow::new(date(2023, 5, 1), date(2023, 5, 3)).unwrap();
        assert_eq!(window.year(), "2023");
        assert_eq!(window.month(), "05");
        assert_eq!(window.day_list(), vec!["01", "02", "03"]);

        let hours = TimeWindow::hour_list();
        assert_eq!(hours.len(), 24);
        assert_eq!(hours[0], "00:00");
        assert_eq!(hours[23], "23:00");
    }

    #[test]
    fn test_identifier() {
        let full = TimeWindow::new(date(2025, 2, 1), date(2025, 2, 28)).unwrap();
        assert_eq!(full.identifier(), "era5_2025_02");

        let partial = TimeWindow::new(date(2025, 3, 1), date(2025, 3, 30)).unwrap();
        assert_eq!(partial.identifier(), "era5_2025_03_01_30");
    }

    #[test]
    fn test_exceeds_budget() {
        let day = TimeWindow::new(date(2025, 5, 1), date(2025, 5, 1)).unwrap();
        assert!(!exceeds_budget(&day, &FetchBudget::new(2, 12000)));

        let month = TimeWindow::new(date(2025, 5, 1), date(2025, 5, 31)).unwrap();
        assert!(exceeds_budget(&month, &FetchBudget::new(18, 12000)));
    }

    #[test]
    fn test_split_to_budget() {
        // 10 variables -> 240 fields per day -> 5 days per request
        let budget = FetchBudget::new(10, 1200);
        let windows = chunk(date(2025, 1, 1), date(2025, 2, 3)).unwrap();
        let split = split_to_budget(windows, &budget).unwrap();

        assert_eq!(split.len(), 8);
        assert!(split.iter().all(|w| !exceeds_budget(w, &budget)));
        assert_covers(&split, date(2025, 1, 1), date(2025, 2, 3));
        assert_eq!(split[6].end(), date(2025, 1, 31));
        assert_eq!(split[7].start(), date(2025, 2, 1));
    }

    #[test]
    fn test_split_leaves_small_windows() {
        let budget = FetchBudget::new(3, 12000);
        let windows = chunk(date(2025, 1, 1), date(2025, 3, 30)).unwrap();
        let split = split_to_budget(windows.clone(), &budget).unwrap();
        assert_eq!(split, windows);
    }

    #[test]
    fn test_budget_too_small() {
        let budget = FetchBudget::new(10, 100);
        let windows = chunk(date(2025, 1, 1), date(2025, 1, 2)).unwrap();
        let err = split_to_budget(windows, &budget).unwrap_err();
        assert!(matches!(err, WindowError::BudgetTooSmall { .. }));
    }
}
