//! Country series catalog using PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use tracing::{debug, info, instrument};

use era5_common::{CountrySeries, Sample, StatKind};

use crate::error::{StorageError, StorageResult};
use crate::series::{stored_bounds, SeriesStore};

/// Database connection pool and series operations.
pub struct PgSeriesStore {
    pool: PgPool,
}

impl PgSeriesStore {
    /// Create a new store connection from database URL.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> StorageResult<()> {
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
            }
        }

        Ok(())
    }

    /// Remove every row of one series. Returns the number of rows deleted.
    pub async fn delete_series(&self, variable: &str, country_code: &str) -> StorageResult<u64> {
        let result =
            sqlx::query("DELETE FROM country_series WHERE variable = $1 AND country_code = $2")
                .bind(variable)
                .bind(country_code.to_uppercase())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SeriesStore for PgSeriesStore {
    #[instrument(
        skip(self, series),
        fields(variable = %series.variable, country = %series.country_code)
    )]
    async fn upsert(&self, series: &CountrySeries) -> StorageResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for (valid_time, value) in series.present() {
            sqlx::query(
                r#"
                INSERT INTO country_series (
                    variable, country_code, valid_time, value, stat, interval_seconds
                ) VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (variable, country_code, valid_time)
                DO UPDATE SET
                    value = EXCLUDED.value,
                    stat = EXCLUDED.stat,
                    interval_seconds = EXCLUDED.interval_seconds
                "#,
            )
            .bind(&series.variable)
            .bind(&series.country_code)
            .bind(valid_time)
            .bind(value)
            .bind(series.stat_kind.as_str())
            .bind(CountrySeries::INTERVAL_SECONDS)
            .execute(&mut *tx)
            .await?;
            written += 1;
        }

        tx.commit().await?;

        info!(written, skipped = series.missing().count(), "Persisted country series");
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
        let (lo, hi) = stored_bounds(stat_kind, start, end);

        let rows = sqlx::query_as::<_, SeriesRow>(
            r#"
            SELECT valid_time, value, stat FROM country_series
            WHERE variable = $1 AND country_code = $2 AND stat = $3
              AND valid_time BETWEEN $4 AND $5
            ORDER BY valid_time
            "#,
        )
        .bind(variable)
        .bind(country_code.to_uppercase())
        .bind(stat_kind.as_str())
        .bind(lo)
        .bind(hi)
        .fetch_all(&self.pool)
        .await?;

        debug!(variable, country_code, rows = rows.len(), "Fetched country series");

        let samples = rows
            .into_iter()
            .map(Sample::try_from)
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(CountrySeries::new(variable, country_code, stat_kind, samples))
    }
}

#[derive(Debug, FromRow)]
struct SeriesRow {
    valid_time: DateTime<Utc>,
    value: f64,
    stat: String,
}

impl TryFrom<SeriesRow> for Sample {
    type Error = StorageError;

    fn try_from(row: SeriesRow) -> Result<Self, Self::Error> {
        if StatKind::parse(&row.stat).is_none() {
            return Err(StorageError::InvalidRow(format!(
                "unknown stat '{}' at {}",
                row.stat, row.valid_time
            )));
        }
        Ok(Sample::new(row.valid_time, Some(row.value)))
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS country_series (
    variable VARCHAR(100) NOT NULL,
    country_code VARCHAR(8) NOT NULL,
    valid_time TIMESTAMPTZ NOT NULL,
    value DOUBLE PRECISION NOT NULL,
    stat TEXT NOT NULL CHECK (stat IN ('integrated_flux', 'instant')),
    interval_seconds INTEGER NOT NULL DEFAULT 3600,

    PRIMARY KEY (variable, country_code, valid_time)
);

CREATE INDEX IF NOT EXISTS idx_country_series_valid_time ON country_series(valid_time DESC)
"#;
