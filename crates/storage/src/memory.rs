//! In-process series store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use era5_common::{CountrySeries, Sample, StatKind};

use crate::error::StorageResult;
use crate::series::{stored_bounds, SeriesStore};

type RowKey = (String, String, DateTime<Utc>);

#[derive(Debug, Clone, Copy)]
struct StoredValue {
    value: f64,
    stat_kind: StatKind,
}

/// Series store backed by an ordered map. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySeriesStore {
    rows: RwLock<BTreeMap<RowKey, StoredValue>>,
}

impl MemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored rows across all series.
    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl SeriesStore for MemorySeriesStore {
    async fn upsert(&self, series: &CountrySeries) -> StorageResult<usize> {
        let mut rows = self.rows.write().await;
        let mut written = 0;
        for (time, value) in series.present() {
            rows.insert(
                (series.variable.clone(), series.country_code.clone(), time),
                StoredValue {
                    value,
                    stat_kind: series.stat_kind,
                },
            );
            written += 1;
        }
        debug!(
            variable = %series.variable,
            country = %series.country_code,
            written,
            "Upserted series into memory store"
        );
        Ok(written)
    }

    async fn fetch(
        &self,
        variable: &str,
        country_code: &str,
        stat_kind: StatKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<CountrySeries> {
        let country_code = country_code.to_uppercase();
        let (lo, hi) = stored_bounds(stat_kind, start, end);
        let samples = if lo > hi {
            Vec::new()
        } else {
            let rows = self.rows.read().await;
            let from = (variable.to_string(), country_code.clone(), lo);
            let to = (variable.to_string(), country_code.clone(), hi);
            rows.range(from..=to)
                .filter(|(_, stored)| stored.stat_kind == stat_kind)
                .map(|((_, _, time), stored)| Sample::new(*time, Some(stored.value)))
                .collect()
        };

        Ok(CountrySeries::new(variable, country_code, stat_kind, samples))
    }
}
