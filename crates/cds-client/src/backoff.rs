//! Exponential backoff with bounded jitter for job polling.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

fn default_base_ms() -> u64 {
    128_000
}

fn default_max_retries() -> u32 {
    7
}

fn default_jitter_percent() -> u32 {
    7
}

/// Delay before poll attempt `n + 1` is `base × 2^(n-1)` plus a jitter
/// drawn uniformly from `[0, base × jitter_percent / 100)`.
///
/// With `jitter_percent < 100` the jitter never exceeds the growth between
/// two attempts, so successive delays strictly increase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,
    /// Polls that may come back not ready before the task times out.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_jitter_percent")]
    pub jitter_percent: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            max_retries: default_max_retries(),
            jitter_percent: default_jitter_percent(),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max_retries: u32, jitter_percent: u32) -> Self {
        Self {
            base_ms: base.as_millis() as u64,
            max_retries,
            jitter_percent: jitter_percent.min(99),
        }
    }

    /// Deterministic part of the delay after the `attempt`-th unsuccessful poll (1-based).
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32);
        self.base_ms.saturating_mul(1u64 << exponent)
    }

    /// Exclusive upper bound of the jitter.
    pub fn jitter_range_ms(&self) -> u64 {
        let percent = u64::from(self.jitter_percent.min(99));
        std::cmp::max(1, self.base_ms.saturating_mul(percent) / 100)
    }

    /// Delay to sleep after the `attempt`-th unsuccessful poll (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = rand::rng();
        let jitter = rng.random_range(0..self.jitter_range_ms());
        Duration::from_millis(self.base_delay_ms(attempt).saturating_add(jitter))
    }
}
