use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, info, instrument};

use crate::db::{
    CityRepository, DailyMetrics, DaySummary, HistoricalDay, HistoricalRepository, MetricStats,
    Observation, ObservationRepository,
};
use crate::error::WeatherError;
use crate::services::observation_store::retention_cutoff;

/// Derives one aggregate per city per UTC day from observations
#[derive(Clone)]
pub struct HistoricalAggregator {
    historical_repo: HistoricalRepository,
    observation_repo: ObservationRepository,
    city_repo: CityRepository,
}

impl HistoricalAggregator {
    pub fn new(
        historical_repo: HistoricalRepository,
        observation_repo: ObservationRepository,
        city_repo: CityRepository,
    ) -> Self {
        Self {
            historical_repo,
            observation_repo,
            city_repo,
        }
    }

    /// Recompute and store the aggregate for one city-day.
    ///
    /// Writers of the same key are serialised by an advisory lock held for
    /// the transaction, and the read and the upsert commit together. Identical
    /// input leaves the stored row untouched; late observations update it.
    /// A day with no visible observations yields `NoData` and writes nothing.
    /// Once a day starts before the retention cutoff its stored aggregate is
    /// final: it is returned unchanged instead of being rebuilt from the
    /// observations that are still visible.
    #[instrument(skip(self))]
    pub async fn aggregate_day(&self, city_id: i64, day: NaiveDate) -> Result<HistoricalDay, WeatherError> {
        if !self.city_repo.exists(city_id).await? {
            return Err(WeatherError::NotFound(format!("city {city_id}")));
        }

        let (day_start, day_end) = day_bounds(day)?;
        let cutoff = retention_cutoff(Utc::now());
        let start = day_start.max(cutoff);

        let mut tx = self.historical_repo.begin().await?;
        self.historical_repo.lock_day_tx(&mut tx, city_id, day).await?;

        // Part of this day's observations have expired. A stored aggregate
        // covers more samples than remain, so it is kept as is.
        if day_start < cutoff {
            if let Some(existing) = self.historical_repo.find_tx(&mut tx, city_id, day).await? {
                tx.rollback().await?;
                debug!(
                    "Day {} for city {} reaches past the retention window; keeping stored aggregate",
                    day, city_id
                );
                return Ok(existing);
            }
        }

        let observations = if start < day_end {
            self.observation_repo
                .find_range_tx(&mut tx, city_id, start, day_end)
                .await?
        } else {
            Vec::new()
        };

        let Some(summary) = summarize_day(&observations) else {
            tx.rollback().await?;
            debug!("No observations for city {} on {}", city_id, day);
            return Err(WeatherError::NoData { city_id, day });
        };

        let written = self
            .historical_repo
            .upsert_tx(&mut tx, city_id, day, &summary)
            .await?;
        let stored = self
            .historical_repo
            .find_tx(&mut tx, city_id, day)
            .await?
            .ok_or_else(|| WeatherError::NotFound(format!("historical day {day} for city {city_id}")))?;
        tx.commit().await?;

        if written {
            info!(
                "Aggregated {} observations for city {} on {}",
                summary.sample_count, city_id, day
            );
        }
        Ok(stored)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, city_id: i64, day: NaiveDate) -> Result<HistoricalDay, WeatherError> {
        self.historical_repo
            .find(city_id, day)
            .await?
            .ok_or_else(|| WeatherError::NotFound(format!("historical day {day} for city {city_id}")))
    }

    /// Stored aggregates for `[from, to]` inclusive, oldest first. Empty when
    /// nothing has been aggregated yet.
    #[instrument(skip(self))]
    pub fn range(
        &self,
        city_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BoxStream<'_, Result<HistoricalDay, WeatherError>>, WeatherError> {
        if from > to {
            return Err(WeatherError::Validation(format!(
                "date range start {from} is after end {to}"
            )));
        }

        Ok(self
            .historical_repo
            .stream_range(city_id, from, to)
            .map_err(WeatherError::from)
            .boxed())
    }
}

/// `[day 00:00 UTC, next day 00:00 UTC)`
pub fn day_bounds(day: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), WeatherError> {
    let next = day
        .succ_opt()
        .ok_or_else(|| WeatherError::Validation(format!("date {day} is out of range")))?;

    Ok((
        day.and_time(NaiveTime::MIN).and_utc(),
        next.and_time(NaiveTime::MIN).and_utc(),
    ))
}

/// Fold a day's observations into min/max/avg per metric.
///
/// Averages are rounded to two decimals; min and max are kept exact.
/// Returns `None` for an empty slice.
pub fn summarize_day(observations: &[Observation]) -> Option<DaySummary> {
    let temperature_c = metric_stats(observations.iter().map(|o| o.metrics.temperature_c))?;

    let first_observed_at = observations.iter().map(|o| o.observed_at).min()?;
    let last_observed_at = observations.iter().map(|o| o.observed_at).max()?;

    let metrics = DailyMetrics {
        temperature_c,
        humidity_pct: metric_stats(observations.iter().filter_map(|o| o.metrics.humidity_pct)),
        wind_speed_mps: metric_stats(observations.iter().filter_map(|o| o.metrics.wind_speed_mps)),
        pressure_hpa: metric_stats(observations.iter().filter_map(|o| o.metrics.pressure_hpa)),
        precipitation_mm: metric_stats(observations.iter().filter_map(|o| o.metrics.precipitation_mm)),
    };

    // Slice lengths are bounded by isize::MAX, so this never fails
    let sample_count = i64::try_from(observations.len()).ok()?;

    Some(DaySummary {
        metrics,
        sample_count,
        first_observed_at,
        last_observed_at,
    })
}

fn metric_stats(values: impl Iterator<Item = f64>) -> Option<MetricStats> {
    let mut count = 0usize;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;

    for value in values {
        count += 1;
        min = min.min(value);
        max = max.max(value);
        sum += value;
    }

    if count == 0 {
        return None;
    }

    Some(MetricStats {
        min,
        max,
        avg: round_2dp(sum / count as f64),
    })
}

fn round_2dp(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // Normalize -0.0 to 0.0 for cleaner API responses
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
