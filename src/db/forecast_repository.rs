use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::db::{DbError, Forecast, WeatherMetrics};

const FORECAST_COLUMNS: &str = r#"
    id, city_id, issued_at, target_timestamp, temperature_c, humidity_pct, wind_speed_mps,
    pressure_hpa, precipitation_mm, condition, source, created_at
"#;

#[derive(Clone)]
pub struct ForecastRepository {
    pool: PgPool,
}

impl ForecastRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Forecasts are append-only; a revision for the same target is a new row.
    #[instrument(skip(self, metrics, source), fields(city_id = city_id, target = %target_timestamp))]
    pub async fn insert(
        &self,
        city_id: i64,
        issued_at: DateTime<Utc>,
        target_timestamp: DateTime<Utc>,
        metrics: &WeatherMetrics,
        source: &str,
    ) -> Result<Forecast, DbError> {
        let forecast = sqlx::query_as::<_, Forecast>(&format!(
            r#"
            INSERT INTO forecasts (
                city_id, issued_at, target_timestamp, temperature_c, humidity_pct,
                wind_speed_mps, pressure_hpa, precipitation_mm, condition, source
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {FORECAST_COLUMNS}
            "#
        ))
        .bind(city_id)
        .bind(issued_at)
        .bind(target_timestamp)
        .bind(metrics.temperature_c)
        .bind(metrics.humidity_pct)
        .bind(metrics.wind_speed_mps)
        .bind(metrics.pressure_hpa)
        .bind(metrics.precipitation_mm)
        .bind(&metrics.condition)
        .bind(source)
        .fetch_one(&self.pool)
        .await?;

        debug!("Inserted forecast {}", forecast.id);
        Ok(forecast)
    }

    /// Latest issue for one target; ties on `issued_at` go to the later insert
    #[instrument(skip(self))]
    pub async fn find_latest_for_target(
        &self,
        city_id: i64,
        target_timestamp: DateTime<Utc>,
    ) -> Result<Option<Forecast>, DbError> {
        let forecast = sqlx::query_as::<_, Forecast>(&format!(
            r#"
            SELECT {FORECAST_COLUMNS}
            FROM forecasts
            WHERE city_id = $1 AND target_timestamp = $2
            ORDER BY issued_at DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(city_id)
        .bind(target_timestamp)
        .fetch_optional(&self.pool)
        .await?;

        Ok(forecast)
    }

    /// Every issue for one target, newest first
    #[instrument(skip(self))]
    pub async fn find_revisions(
        &self,
        city_id: i64,
        target_timestamp: DateTime<Utc>,
    ) -> Result<Vec<Forecast>, DbError> {
        let forecasts = sqlx::query_as::<_, Forecast>(&format!(
            r#"
            SELECT {FORECAST_COLUMNS}
            FROM forecasts
            WHERE city_id = $1 AND target_timestamp = $2
            ORDER BY issued_at DESC, id DESC
            "#
        ))
        .bind(city_id)
        .bind(target_timestamp)
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} revisions", forecasts.len());
        Ok(forecasts)
    }

    /// Stream the latest issue per distinct target in `[start, end]`, earliest target first
    pub fn stream_latest_per_target(
        &self,
        city_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxStream<'_, Result<Forecast, DbError>> {
        sqlx::query_as::<_, Forecast>(
            r#"
            SELECT DISTINCT ON (target_timestamp)
                   id, city_id, issued_at, target_timestamp, temperature_c, humidity_pct,
                   wind_speed_mps, pressure_hpa, precipitation_mm, condition, source, created_at
            FROM forecasts
            WHERE city_id = $1 AND target_timestamp >= $2 AND target_timestamp <= $3
            ORDER BY target_timestamp ASC, issued_at DESC, id DESC
            "#,
        )
        .bind(city_id)
        .bind(start)
        .bind(end)
        .fetch(&self.pool)
        .map_err(DbError::from)
        .boxed()
    }

    #[instrument(skip(self))]
    pub async fn count_for_city(&self, city_id: i64) -> Result<usize, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM forecasts WHERE city_id = $1")
            .bind(city_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }
}
