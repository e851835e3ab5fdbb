use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::db::{City, CityInput, CityRepository, DeleteOutcome, UpsertOutcome};
use crate::error::WeatherError;
use crate::validation::{normalize_country, validate_city, validate_coordinates};

#[derive(Debug, Clone, Serialize)]
pub struct CityUpsert {
    pub city: City,
    pub outcome: UpsertOutcome,
}

/// Authoritative set of monitored locations
#[derive(Clone)]
pub struct CityRegistry {
    city_repo: CityRepository,
}

impl CityRegistry {
    pub fn new(city_repo: CityRepository) -> Self {
        Self { city_repo }
    }

    /// Insert a new city or merge fields into the existing (name, country) entry
    #[instrument(skip(self, input), fields(name = %input.name, country = %input.country))]
    pub async fn upsert(&self, input: &CityInput) -> Result<CityUpsert, WeatherError> {
        let city = validate_city(input)?;
        let (city, outcome) = self.city_repo.upsert(&city).await?;

        match outcome {
            UpsertOutcome::Inserted => info!("Inserted city {}, {}", city.name, city.country),
            UpsertOutcome::Updated => debug!("Updated city {}, {}", city.name, city.country),
        }
        Ok(CityUpsert { city, outcome })
    }

    #[instrument(skip(self))]
    pub async fn find(&self, name: &str, country: &str) -> Result<City, WeatherError> {
        let country = normalize_country(country)?;
        self.city_repo
            .find(name.trim(), &country)
            .await?
            .ok_or_else(|| WeatherError::NotFound(format!("city {}, {}", name.trim(), country)))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i64) -> Result<City, WeatherError> {
        self.city_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| WeatherError::NotFound(format!("city {id}")))
    }

    /// Resolve a caller-supplied city name. Without a country the name must
    /// be unambiguous.
    #[instrument(skip(self))]
    pub async fn resolve(&self, name: &str, country: Option<&str>) -> Result<City, WeatherError> {
        if let Some(country) = country {
            return self.find(name, country).await;
        }

        let mut matches = self.city_repo.find_by_name(name.trim()).await?;
        match matches.len() {
            0 => Err(WeatherError::NotFound(format!("city {}", name.trim()))),
            1 => Ok(matches.remove(0)),
            n => Err(WeatherError::Validation(format!(
                "{n} cities named {}; specify a country",
                name.trim()
            ))),
        }
    }

    /// Lazy, insertion-ordered sequence of cities. Restartable: every call
    /// runs a fresh query.
    pub fn list(&self, active_only: bool) -> BoxStream<'_, Result<City, WeatherError>> {
        self.city_repo
            .stream(active_only)
            .map_err(WeatherError::from)
            .boxed()
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<usize, WeatherError> {
        Ok(self.city_repo.count().await?)
    }

    /// Mark a city inactive. The record is kept.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, id: i64) -> Result<City, WeatherError> {
        self.city_repo
            .set_active(id, false)
            .await?
            .ok_or_else(|| WeatherError::NotFound(format!("city {id}")))
    }

    #[instrument(skip(self))]
    pub async fn update_coordinates(
        &self,
        id: i64,
        latitude: f64,
        longitude: f64,
    ) -> Result<City, WeatherError> {
        validate_coordinates(latitude, longitude)?;
        self.city_repo
            .update_coordinates(id, latitude, longitude)
            .await?
            .ok_or_else(|| WeatherError::NotFound(format!("city {id}")))
    }

    /// Delete a city that nothing references. Cities with observations,
    /// forecasts or historical days are rejected with `CityReferenced`.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), WeatherError> {
        match self.city_repo.delete(id).await? {
            DeleteOutcome::Deleted => Ok(()),
            DeleteOutcome::NotFound => Err(WeatherError::NotFound(format!("city {id}"))),
            DeleteOutcome::Referenced => Err(WeatherError::CityReferenced(id)),
        }
    }
}
