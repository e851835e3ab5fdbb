use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use crate::db::models::HistoricalDayRow;
use crate::db::{DailyMetrics, DbError, HistoricalDay};

const HISTORICAL_COLUMNS: &str = r#"
    city_id, day, metrics, sample_count, first_observed_at, last_observed_at, created_at, updated_at
"#;

/// Computed aggregate for one (city, day), ready to store
#[derive(Debug, Clone, PartialEq)]
pub struct DaySummary {
    pub metrics: DailyMetrics,
    pub sample_count: i64,
    pub first_observed_at: DateTime<Utc>,
    pub last_observed_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct HistoricalRepository {
    pool: PgPool,
}

impl HistoricalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, DbError> {
        Ok(self.pool.begin().await?)
    }

    /// Serialize writers of one (city, day) key until the transaction ends
    #[instrument(skip(self, tx))]
    pub async fn lock_day_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        city_id: i64,
        day: NaiveDate,
    ) -> Result<(), DbError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("historical_days:{city_id}:{day}"))
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Upsert a day aggregate. The update only fires when the stored values
    /// differ, so recomputing identical input leaves the row untouched.
    /// Returns whether a row was written.
    #[instrument(skip(self, tx, summary), fields(samples = summary.sample_count))]
    pub async fn upsert_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        city_id: i64,
        day: NaiveDate,
        summary: &DaySummary,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO historical_days
                (city_id, day, metrics, sample_count, first_observed_at, last_observed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT ON CONSTRAINT historical_days_city_day_key DO UPDATE SET
                metrics = EXCLUDED.metrics,
                sample_count = EXCLUDED.sample_count,
                first_observed_at = EXCLUDED.first_observed_at,
                last_observed_at = EXCLUDED.last_observed_at,
                updated_at = NOW()
            WHERE historical_days.metrics IS DISTINCT FROM EXCLUDED.metrics
               OR historical_days.sample_count IS DISTINCT FROM EXCLUDED.sample_count
               OR historical_days.first_observed_at IS DISTINCT FROM EXCLUDED.first_observed_at
               OR historical_days.last_observed_at IS DISTINCT FROM EXCLUDED.last_observed_at
            "#,
        )
        .bind(city_id)
        .bind(day)
        .bind(Json(&summary.metrics))
        .bind(summary.sample_count)
        .bind(summary.first_observed_at)
        .bind(summary.last_observed_at)
        .execute(&mut **tx)
        .await?;

        let written = result.rows_affected() > 0;
        debug!("Historical day {} for city {} written: {}", day, city_id, written);
        Ok(written)
    }

    #[instrument(skip(self, tx))]
    pub async fn find_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        city_id: i64,
        day: NaiveDate,
    ) -> Result<Option<HistoricalDay>, DbError> {
        let row = sqlx::query_as::<_, HistoricalDayRow>(&format!(
            "SELECT {HISTORICAL_COLUMNS} FROM historical_days WHERE city_id = $1 AND day = $2"
        ))
        .bind(city_id)
        .bind(day)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(HistoricalDay::from))
    }

    #[instrument(skip(self))]
    pub async fn find(&self, city_id: i64, day: NaiveDate) -> Result<Option<HistoricalDay>, DbError> {
        let row = sqlx::query_as::<_, HistoricalDayRow>(&format!(
            "SELECT {HISTORICAL_COLUMNS} FROM historical_days WHERE city_id = $1 AND day = $2"
        ))
        .bind(city_id)
        .bind(day)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(HistoricalDay::from))
    }

    /// Stream stored days in `[from, to]` (inclusive), oldest first
    pub fn stream_range(
        &self,
        city_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BoxStream<'_, Result<HistoricalDay, DbError>> {
        sqlx::query_as::<_, HistoricalDayRow>(
            r#"
            SELECT city_id, day, metrics, sample_count, first_observed_at, last_observed_at,
                   created_at, updated_at
            FROM historical_days
            WHERE city_id = $1 AND day >= $2 AND day <= $3
            ORDER BY day ASC
            "#,
        )
        .bind(city_id)
        .bind(from)
        .bind(to)
        .fetch(&self.pool)
        .map_ok(HistoricalDay::from)
        .map_err(DbError::from)
        .boxed()
    }

    #[instrument(skip(self))]
    pub async fn count_for_city(&self, city_id: i64) -> Result<usize, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM historical_days WHERE city_id = $1")
            .bind(city_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }
}
