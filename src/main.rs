use tracing::{info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use weatherwise_service::app::Application;
use weatherwise_service::config::Config;
use weatherwise_service::db::pool;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing with environment filter support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,weatherwise_service=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Missing configuration is fatal: never serve half-configured
    let config = Config::from_env()?;
    info!("Starting WeatherWise service with config: {:?}", config);

    info!("Connecting to database...");
    let pool = pool::connect(&config).await?;

    info!("Running database migrations...");
    pool::run_migrations(&pool).await?;
    info!("Database migrations completed");

    let app = Application::build(config, pool).await?;
    app.run_until_stopped().await?;

    info!("WeatherWise service stopped");
    Ok(())
}
