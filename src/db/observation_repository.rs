use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, instrument};

use crate::db::{DbError, Observation, WeatherMetrics};

const OBSERVATION_COLUMNS: &str = r#"
    id, city_id, observed_at, temperature_c, humidity_pct, wind_speed_mps,
    pressure_hpa, precipitation_mm, condition, source, created_at, updated_at
"#;

#[derive(Clone)]
pub struct ObservationRepository {
    pool: PgPool,
}

impl ObservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert keyed by (city_id, observed_at). A repeated key overwrites the
    /// stored metrics; the row count never grows for the same key.
    #[instrument(skip(self, metrics, source), fields(city_id = city_id, observed_at = %observed_at))]
    pub async fn upsert(
        &self,
        city_id: i64,
        observed_at: DateTime<Utc>,
        metrics: &WeatherMetrics,
        source: &str,
    ) -> Result<Observation, DbError> {
        let observation = sqlx::query_as::<_, Observation>(&format!(
            r#"
            INSERT INTO observations (
                city_id, observed_at, temperature_c, humidity_pct, wind_speed_mps,
                pressure_hpa, precipitation_mm, condition, source
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT ON CONSTRAINT observations_city_time_key DO UPDATE SET
                temperature_c = EXCLUDED.temperature_c,
                humidity_pct = EXCLUDED.humidity_pct,
                wind_speed_mps = EXCLUDED.wind_speed_mps,
                pressure_hpa = EXCLUDED.pressure_hpa,
                precipitation_mm = EXCLUDED.precipitation_mm,
                condition = EXCLUDED.condition,
                source = EXCLUDED.source,
                updated_at = NOW()
            RETURNING {OBSERVATION_COLUMNS}
            "#
        ))
        .bind(city_id)
        .bind(observed_at)
        .bind(metrics.temperature_c)
        .bind(metrics.humidity_pct)
        .bind(metrics.wind_speed_mps)
        .bind(metrics.pressure_hpa)
        .bind(metrics.precipitation_mm)
        .bind(&metrics.condition)
        .bind(source)
        .fetch_one(&self.pool)
        .await?;

        debug!("Stored observation {}", observation.id);
        Ok(observation)
    }

    /// Most recent observation captured at or after `cutoff`
    #[instrument(skip(self))]
    pub async fn find_latest(
        &self,
        city_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Observation>, DbError> {
        let observation = sqlx::query_as::<_, Observation>(&format!(
            r#"
            SELECT {OBSERVATION_COLUMNS}
            FROM observations
            WHERE city_id = $1 AND observed_at >= $2
            ORDER BY observed_at DESC
            LIMIT 1
            "#
        ))
        .bind(city_id)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        if observation.is_none() {
            debug!("No visible observations for city {}", city_id);
        }
        Ok(observation)
    }

    /// Stream observations in `[start, end)`, oldest first
    pub fn stream_range(
        &self,
        city_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxStream<'_, Result<Observation, DbError>> {
        sqlx::query_as::<_, Observation>(
            r#"
            SELECT id, city_id, observed_at, temperature_c, humidity_pct, wind_speed_mps,
                   pressure_hpa, precipitation_mm, condition, source, created_at, updated_at
            FROM observations
            WHERE city_id = $1 AND observed_at >= $2 AND observed_at < $3
            ORDER BY observed_at ASC
            "#,
        )
        .bind(city_id)
        .bind(start)
        .bind(end)
        .fetch(&self.pool)
        .map_err(DbError::from)
        .boxed()
    }

    /// Observations in `[start, end)` read inside an open transaction, oldest first
    #[instrument(skip(self, tx))]
    pub async fn find_range_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        city_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, DbError> {
        let observations = sqlx::query_as::<_, Observation>(&format!(
            r#"
            SELECT {OBSERVATION_COLUMNS}
            FROM observations
            WHERE city_id = $1 AND observed_at >= $2 AND observed_at < $3
            ORDER BY observed_at ASC
            "#
        ))
        .bind(city_id)
        .bind(start)
        .bind(end)
        .fetch_all(&mut **tx)
        .await?;

        debug!("Found {} observations", observations.len());
        Ok(observations)
    }

    #[instrument(skip(self))]
    pub async fn count_for_city(&self, city_id: i64) -> Result<usize, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM observations WHERE city_id = $1")
            .bind(city_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }

    /// Physically remove observations captured before `cutoff`
    #[instrument(skip(self))]
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM observations WHERE observed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!("Purged {} expired observations", purged);
        }
        Ok(purged)
    }
}
