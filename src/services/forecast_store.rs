use chrono::{DateTime, Duration, Utc};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use tracing::instrument;

use crate::db::{CityRepository, Forecast, ForecastRepository, WeatherMetrics};
use crate::error::WeatherError;
use crate::validation::{validate_metrics, validate_source};

/// Predicted readings keyed by target time, with full revision history
#[derive(Clone)]
pub struct ForecastStore {
    forecast_repo: ForecastRepository,
    city_repo: CityRepository,
}

impl ForecastStore {
    pub fn new(forecast_repo: ForecastRepository, city_repo: CityRepository) -> Self {
        Self {
            forecast_repo,
            city_repo,
        }
    }

    /// Always inserts. Earlier issues for the same target are kept.
    #[instrument(skip(self, metrics, source), fields(city_id = city_id, issued_at = %issued_at, target = %target_timestamp))]
    pub async fn record(
        &self,
        city_id: i64,
        issued_at: DateTime<Utc>,
        target_timestamp: DateTime<Utc>,
        metrics: &WeatherMetrics,
        source: &str,
    ) -> Result<Forecast, WeatherError> {
        if target_timestamp < issued_at {
            return Err(WeatherError::Validation(format!(
                "forecast target {target_timestamp} precedes issue time {issued_at}"
            )));
        }
        validate_metrics(metrics)?;
        let source = validate_source(source)?;

        if !self.city_repo.exists(city_id).await? {
            return Err(WeatherError::Validation(format!("unknown city {city_id}")));
        }

        Ok(self
            .forecast_repo
            .insert(city_id, issued_at, target_timestamp, metrics, &source)
            .await?)
    }

    /// Most recently issued forecast for one target instant
    #[instrument(skip(self))]
    pub async fn latest_for_target(
        &self,
        city_id: i64,
        target_timestamp: DateTime<Utc>,
    ) -> Result<Forecast, WeatherError> {
        self.forecast_repo
            .find_latest_for_target(city_id, target_timestamp)
            .await?
            .ok_or_else(|| {
                WeatherError::NotFound(format!(
                    "no forecast for city {city_id} targeting {target_timestamp}"
                ))
            })
    }

    /// All issues for one target, newest first
    #[instrument(skip(self))]
    pub async fn revisions(
        &self,
        city_id: i64,
        target_timestamp: DateTime<Utc>,
    ) -> Result<Vec<Forecast>, WeatherError> {
        Ok(self
            .forecast_repo
            .find_revisions(city_id, target_timestamp)
            .await?)
    }

    /// Best current forecast per target within `[now, now + horizon]`,
    /// earliest target first. Targets already in the past are excluded.
    #[instrument(skip(self))]
    pub fn upcoming(
        &self,
        city_id: i64,
        horizon: Duration,
    ) -> Result<BoxStream<'_, Result<Forecast, WeatherError>>, WeatherError> {
        if horizon < Duration::zero() {
            return Err(WeatherError::Validation(format!(
                "forecast horizon must not be negative, got {horizon}"
            )));
        }

        let now = Utc::now();
        let end = now.checked_add_signed(horizon).ok_or_else(|| {
            WeatherError::Validation(format!("forecast horizon {horizon} is out of range"))
        })?;

        Ok(self
            .forecast_repo
            .stream_latest_per_target(city_id, now, end)
            .map_err(WeatherError::from)
            .boxed())
    }
}
