use chrono::{Duration, NaiveDate};
use futures::stream::TryStreamExt;
use tracing::{debug, instrument};

use crate::db::{CurrentWeather, ForecastOutlook, WeatherHistory};
use crate::error::WeatherError;
use crate::services::{CityRegistry, ForecastStore, HistoricalAggregator, ObservationStore};

pub const DEFAULT_FORECAST_HORIZON_HOURS: i64 = 48;
pub const MAX_FORECAST_HORIZON_HOURS: i64 = 16 * 24;
pub const MAX_HISTORY_DAYS: i64 = 366;

/// Read-side entry points used by the HTTP layer. Every query resolves the
/// city name through the registry first.
#[derive(Clone)]
pub struct WeatherService {
    registry: CityRegistry,
    observations: ObservationStore,
    forecasts: ForecastStore,
    history: HistoricalAggregator,
}

impl WeatherService {
    pub fn new(
        registry: CityRegistry,
        observations: ObservationStore,
        forecasts: ForecastStore,
        history: HistoricalAggregator,
    ) -> Self {
        Self {
            registry,
            observations,
            forecasts,
            history,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_current(
        &self,
        city_name: &str,
        country: Option<&str>,
    ) -> Result<CurrentWeather, WeatherError> {
        let city = self.registry.resolve(city_name, country).await?;
        let observation = self.observations.latest(city.id).await?;
        Ok(CurrentWeather { city, observation })
    }

    #[instrument(skip(self))]
    pub async fn get_forecast(
        &self,
        city_name: &str,
        country: Option<&str>,
        horizon_hours: Option<i64>,
    ) -> Result<ForecastOutlook, WeatherError> {
        let horizon_hours = horizon_hours.unwrap_or(DEFAULT_FORECAST_HORIZON_HOURS);
        if !(0..=MAX_FORECAST_HORIZON_HOURS).contains(&horizon_hours) {
            return Err(WeatherError::Validation(format!(
                "horizon must be between 0 and {MAX_FORECAST_HORIZON_HOURS} hours"
            )));
        }

        let city = self.registry.resolve(city_name, country).await?;
        let forecasts: Vec<_> = self
            .forecasts
            .upcoming(city.id, Duration::hours(horizon_hours))?
            .try_collect()
            .await?;

        debug!("Found {} upcoming forecasts for {}", forecasts.len(), city.name);
        Ok(ForecastOutlook {
            city,
            horizon_hours,
            forecasts,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_history(
        &self,
        city_name: &str,
        country: Option<&str>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<WeatherHistory, WeatherError> {
        if (to - from).num_days() >= MAX_HISTORY_DAYS {
            return Err(WeatherError::Validation(format!(
                "history range is limited to {MAX_HISTORY_DAYS} days"
            )));
        }

        let city = self.registry.resolve(city_name, country).await?;
        let days: Vec<_> = self.history.range(city.id, from, to)?.try_collect().await?;

        debug!("Found {} historical days for {}", days.len(), city.name);
        Ok(WeatherHistory {
            city,
            from,
            to,
            days,
        })
    }
}
