use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, instrument};

use crate::db::{CityRepository, Observation, ObservationRepository, WeatherMetrics};
use crate::error::WeatherError;
use crate::validation::{validate_metrics, validate_source};

/// Observations older than this are never returned and are eventually purged
pub const OBSERVATION_RETENTION_DAYS: i64 = 180;

/// Same window in seconds, as declared to the store
pub const OBSERVATION_RETENTION_SECS: i64 = OBSERVATION_RETENTION_DAYS * 24 * 60 * 60;

/// Oldest capture time still visible at `now`
pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(OBSERVATION_RETENTION_DAYS)
}

/// Point-in-time readings with a fixed retention window
#[derive(Clone)]
pub struct ObservationStore {
    observation_repo: ObservationRepository,
    city_repo: CityRepository,
    clock_skew: Duration,
}

impl ObservationStore {
    pub fn new(
        observation_repo: ObservationRepository,
        city_repo: CityRepository,
        clock_skew_tolerance_secs: i64,
    ) -> Self {
        Self {
            observation_repo,
            city_repo,
            clock_skew: Duration::seconds(clock_skew_tolerance_secs),
        }
    }

    /// Record a reading. Re-recording the same (city, timestamp) overwrites
    /// the earlier values, so retries never create duplicate points.
    #[instrument(skip(self, metrics, source), fields(city_id = city_id, observed_at = %observed_at))]
    pub async fn record(
        &self,
        city_id: i64,
        observed_at: DateTime<Utc>,
        metrics: &WeatherMetrics,
        source: &str,
    ) -> Result<Observation, WeatherError> {
        validate_metrics(metrics)?;
        let source = validate_source(source)?;

        let latest_allowed = Utc::now() + self.clock_skew;
        if observed_at > latest_allowed {
            return Err(WeatherError::Validation(format!(
                "observation timestamp {observed_at} is in the future"
            )));
        }

        if !self.city_repo.exists(city_id).await? {
            return Err(WeatherError::Validation(format!("unknown city {city_id}")));
        }

        Ok(self
            .observation_repo
            .upsert(city_id, observed_at, metrics, &source)
            .await?)
    }

    /// Newest visible observation for a city
    #[instrument(skip(self))]
    pub async fn latest(&self, city_id: i64) -> Result<Observation, WeatherError> {
        let cutoff = retention_cutoff(Utc::now());
        self.observation_repo
            .find_latest(city_id, cutoff)
            .await?
            .ok_or_else(|| WeatherError::NotFound(format!("no current observation for city {city_id}")))
    }

    /// Lazy ascending sequence of visible observations in `[from, to)`.
    /// The lower bound is clamped to the retention cutoff.
    #[instrument(skip(self))]
    pub fn range(
        &self,
        city_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BoxStream<'_, Result<Observation, WeatherError>>, WeatherError> {
        if from > to {
            return Err(WeatherError::Validation(format!(
                "range start {from} is after end {to}"
            )));
        }

        let start = from.max(retention_cutoff(Utc::now()));
        if start >= to {
            debug!("Requested range lies entirely outside the retention window");
            return Ok(stream::empty().boxed());
        }

        Ok(self
            .observation_repo
            .stream_range(city_id, start, to)
            .map_err(WeatherError::from)
            .boxed())
    }

    /// Physically delete expired observations. Reads never depend on this.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<u64, WeatherError> {
        let cutoff = retention_cutoff(Utc::now());
        Ok(self.observation_repo.purge_older_than(cutoff).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_retention_window_is_180_days() {
        assert_eq!(OBSERVATION_RETENTION_SECS, 15_552_000);
    }

    #[test]
    fn test_retention_cutoff() {
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        let cutoff = retention_cutoff(now);
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2025, 1, 2, 12, 0, 0).unwrap());
    }
}
