use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::TryStreamExt;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, instrument, warn};

use crate::error::WeatherError;
use crate::services::{CityRegistry, HistoricalAggregator, ObservationStore};

/// Periodically delete observations that fell out of the retention window.
/// Reads already hide them, so a missed tick only delays reclaiming space.
#[instrument(skip(observations), fields(interval_minutes = %interval_minutes))]
pub async fn start_retention_scheduler(observations: ObservationStore, interval_minutes: u64) {
    let mut interval = time::interval(Duration::from_secs(interval_minutes * 60));

    info!("Retention scheduler started with {} minute interval", interval_minutes);

    loop {
        interval.tick().await;
        debug!("Retention tick - purging expired observations");

        match observations.purge_expired().await {
            Ok(purged) if purged > 0 => info!("Purged {} expired observations", purged),
            Ok(_) => debug!("No expired observations to purge"),
            Err(e) => error!("Failed to purge expired observations: {}", e),
        }
    }
}

/// Periodically re-aggregate yesterday and today for every active city so
/// late-arriving observations are folded into the daily history.
#[instrument(skip(registry, aggregator), fields(interval_minutes = %interval_minutes))]
pub async fn start_aggregation_scheduler(
    registry: CityRegistry,
    aggregator: HistoricalAggregator,
    interval_minutes: u64,
) {
    let mut interval = time::interval(Duration::from_secs(interval_minutes * 60));

    info!("Aggregation scheduler started with {} minute interval", interval_minutes);

    loop {
        interval.tick().await;
        debug!("Aggregation tick - refreshing recent days");

        match aggregate_recent_days(&registry, &aggregator).await {
            Ok(aggregated) => debug!("Refreshed {} city-days", aggregated),
            Err(e) => error!("Failed to refresh historical aggregates: {}", e),
        }
    }
}

#[instrument(skip(registry, aggregator))]
async fn aggregate_recent_days(
    registry: &CityRegistry,
    aggregator: &HistoricalAggregator,
) -> Result<usize, WeatherError> {
    let today = Utc::now().date_naive();
    let yesterday = today - ChronoDuration::days(1);
    let cities: Vec<_> = registry.list(true).try_collect().await?;

    let mut aggregated = 0;
    for city in &cities {
        for day in [yesterday, today] {
            match aggregator.aggregate_day(city.id, day).await {
                Ok(_) => aggregated += 1,
                Err(WeatherError::NoData { .. }) => {}
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => warn!("Skipping {} on {}: {}", city.name, day, e),
            }
        }
    }

    Ok(aggregated)
}
