//! Per-country hourly series, the final output of a reduction.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How a variable's values relate to time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    /// Value observed at the timestamp (temperature, wind components).
    Instant,
    /// Value integrated over the hour ending at the timestamp (radiation, precipitation).
    IntegratedFlux,
}

impl StatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::Instant => "instant",
            StatKind::IntegratedFlux => "integrated_flux",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "instant" => Some(StatKind::Instant),
            "integrated_flux" => Some(StatKind::IntegratedFlux),
            _ => None,
        }
    }
}

impl std::fmt::Display for StatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestep of a series. `value` is `None` when no grid cell contributed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub value: Option<f64>,
}

impl Sample {
    pub fn new(time: DateTime<Utc>, value: Option<f64>) -> Self {
        Self { time, value }
    }
}

/// Spatially reduced series of one variable over one country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountrySeries {
    pub variable: String,
    /// ISO 3166-1 alpha-2 code, upper case.
    pub country_code: String,
    pub stat_kind: StatKind,
    pub samples: Vec<Sample>,
}

impl CountrySeries {
    /// Length of the interval each sample represents.
    pub const INTERVAL_SECONDS: i32 = 3600;

    pub fn new(
        variable: impl Into<String>,
        country_code: impl Into<String>,
        stat_kind: StatKind,
        samples: Vec<Sample>,
    ) -> Self {
        Self {
            variable: variable.into(),
            country_code: country_code.into().to_uppercase(),
            stat_kind,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timesteps for which no value could be computed.
    pub fn missing(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(|s| s.value.is_none())
    }

    /// Samples that carry a value.
    pub fn present(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.samples
            .iter()
            .filter_map(|s| s.value.map(|v| (s.time, v)))
    }

    /// Start of the interval a sample timestamp refers to.
    ///
    /// Flux samples are stamped at the end of their hour.
    pub fn interval_start(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        match self.stat_kind {
            StatKind::Instant => time,
            StatKind::IntegratedFlux => time - Duration::seconds(Self::INTERVAL_SECONDS as i64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stat_kind_round_trip() {
        for kind in [StatKind::Instant, StatKind::IntegratedFlux] {
            assert_eq!(StatKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(StatKind::parse("mean"), None);
    }

    #[test]
    fn test_missing_and_present() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let series = CountrySeries::new(
            "t2m",
            "at",
            StatKind::Instant,
            vec![
                Sample::new(t0, Some(271.5)),
                Sample::new(t0 + Duration::hours(1), None),
            ],
        );

        assert_eq!(series.country_code, "AT");
        assert_eq!(series.missing().count(), 1);
        assert_eq!(series.present().collect::<Vec<_>>(), vec![(t0, 271.5)]);
    }

    #[test]
    fn test_flux_interval_start() {
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap();
        let flux = CountrySeries::new("ssrd", "AT", StatKind::IntegratedFlux, vec![]);
        assert_eq!(flux.interval_start(t1), t1 - Duration::hours(1));

        let instant = CountrySeries::new("t2m", "AT", StatKind::Instant, vec![]);
        assert_eq!(instant.interval_start(t1), t1);
    }
}
