use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument};

use crate::db::pool::run_migrations;
use crate::db::{CityRepository, DbError, RetentionPolicyRepository, UpsertOutcome};
use crate::error::WeatherError;
use crate::seed::SeedList;
use crate::services::observation_store::OBSERVATION_RETENTION_SECS;
use crate::services::CityRegistry;

/// Collection name under which the observation retention window is declared
pub const OBSERVATIONS_COLLECTION: &str = "observations";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub inserted: usize,
    pub updated: usize,
    pub total_cities: usize,
}

/// Stateless, re-runnable provisioning: schema, retention policy, seed cities.
pub struct Bootstrap;

impl Bootstrap {
    /// Running this twice with the same seed list leaves the same observable
    /// state as running it once.
    #[instrument(skip(pool, seed), fields(seed_cities = seed.len()))]
    pub async fn run(pool: &PgPool, seed: &SeedList) -> Result<BootstrapReport, WeatherError> {
        info!("Applying schema (constraints and indexes)");
        run_migrations(pool).await.map_err(DbError::from)?;

        info!("Declaring observation retention window");
        RetentionPolicyRepository::new(pool.clone())
            .declare(OBSERVATIONS_COLLECTION, OBSERVATION_RETENTION_SECS)
            .await?;

        let registry = CityRegistry::new(CityRepository::new(pool.clone()));
        let mut report = BootstrapReport::default();

        for city in &seed.cities {
            let upserted = registry.upsert(city).await?;
            match upserted.outcome {
                UpsertOutcome::Inserted => {
                    report.inserted += 1;
                    info!("Inserted: {}, {}", upserted.city.name, upserted.city.country);
                }
                UpsertOutcome::Updated => {
                    report.updated += 1;
                    info!("Updated: {}, {}", upserted.city.name, upserted.city.country);
                }
            }
        }

        report.total_cities = registry.count().await?;
        info!(
            "Bootstrap complete: {} inserted, {} updated, {} cities in registry",
            report.inserted, report.updated, report.total_cities
        );
        Ok(report)
    }
}
