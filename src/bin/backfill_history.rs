use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use clap::Parser;
use futures::stream::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use weatherwise_service::db::{City, CityRepository, HistoricalRepository, ObservationRepository};
use weatherwise_service::db::pool;
use weatherwise_service::error::WeatherError;
use weatherwise_service::services::{CityRegistry, HistoricalAggregator};

#[derive(Parser)]
#[command(name = "backfill-history")]
#[command(about = "Recompute daily historical summaries from stored observations", long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env)]
    database_url: String,

    /// Database name (overrides any database in the URL)
    #[arg(long, env)]
    database_name: String,

    /// Only backfill this city (defaults to every active city)
    #[arg(long)]
    city: Option<String>,

    /// Country code used to disambiguate --city
    #[arg(long)]
    country: Option<String>,

    /// First UTC day to aggregate (default: 7 days ago)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last UTC day to aggregate, inclusive (default: today)
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if it exists (ignore errors if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let today = Utc::now().date_naive();
    let to = cli.to.unwrap_or(today);
    let from = cli.from.unwrap_or(to - ChronoDuration::days(7));
    if from > to {
        return Err(format!("--from {from} is after --to {to}").into());
    }

    info!("Connecting to database...");
    let pool = pool::connect_to(&cli.database_url, &cli.database_name, 5, Duration::from_secs(10)).await?;

    let city_repo = CityRepository::new(pool.clone());
    let registry = CityRegistry::new(city_repo.clone());
    let aggregator = HistoricalAggregator::new(
        HistoricalRepository::new(pool.clone()),
        ObservationRepository::new(pool.clone()),
        city_repo,
    );

    let cities: Vec<City> = match cli.city.as_deref() {
        Some(name) => vec![registry.resolve(name, cli.country.as_deref()).await?],
        None => registry.list(true).try_collect().await?,
    };

    let days: Vec<NaiveDate> = from.iter_days().take_while(|d| *d <= to).collect();
    info!(
        "Backfilling {} cities over {} days ({} to {})",
        cities.len(),
        days.len(),
        from,
        to
    );

    let start = Instant::now();
    let pb = ProgressBar::new((cities.len() * days.len()) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );

    let mut aggregated = 0;
    let mut empty = 0;
    let mut failed = 0;

    for city in &cities {
        pb.set_message(city.name.clone());
        for day in &days {
            match aggregator.aggregate_day(city.id, *day).await {
                Ok(_) => aggregated += 1,
                Err(WeatherError::NoData { .. }) => empty += 1,
                Err(e) if e.is_retryable() => {
                    pb.abandon_with_message("store unavailable");
                    return Err(e.into());
                }
                Err(e) => {
                    warn!("Failed to aggregate {} on {}: {}", city.name, day, e);
                    failed += 1;
                }
            }
            pb.inc(1);
        }
    }

    pb.finish_with_message(format!(
        "✓ {aggregated} days aggregated, {empty} without observations"
    ));
    pool.close().await;

    println!("\n=== Backfill Summary ===");
    println!("Aggregated:          {aggregated}");
    println!("No observations:     {empty}");
    println!("Failed:              {failed}");
    println!("Elapsed:             {:.2?}", start.elapsed());

    if failed > 0 {
        return Err(format!("{failed} city-days failed to aggregate").into());
    }
    Ok(())
}
