use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::{info, instrument};

use crate::config::Config;

/// Build the process-wide connection pool.
///
/// The database named in `DATABASE_NAME` takes precedence over any database
/// embedded in the connection string.
#[instrument(skip(config), fields(database = %config.database_name))]
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    connect_to(
        &config.database_url,
        &config.database_name,
        config.database_max_connections,
        Duration::from_secs(config.database_acquire_timeout_secs),
    )
    .await
}

/// Pool for the command-line tools, which take their settings from flags
pub async fn connect_to(
    database_url: &str,
    database_name: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(database_url)?.database(database_name);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect_with(options)
        .await?;

    info!("Database connection established");
    Ok(pool)
}

/// Apply the schema. Every statement is idempotent and the migrator records
/// applied versions, so this is safe to call on each startup.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
