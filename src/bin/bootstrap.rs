use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use weatherwise_service::bootstrap::Bootstrap;
use weatherwise_service::db::pool;
use weatherwise_service::seed::SeedList;

#[derive(Parser)]
#[command(name = "bootstrap")]
#[command(about = "Create the schema, declare retention and seed the monitored cities", long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env)]
    database_url: String,

    /// Database to provision (overrides any database in the URL)
    #[arg(long, env)]
    database_name: String,

    /// TOML file listing the cities to seed
    #[arg(long, env, default_value = "config/cities.toml")]
    seed_file: PathBuf,
}

#[tokio::main]
async fn main() {
    // Load .env file if it exists (ignore errors if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("Bootstrap failed: {}", e);
        eprintln!("✗ Bootstrap failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let seed = SeedList::from_file(&cli.seed_file)?;
    info!("Loaded {} cities from {}", seed.len(), cli.seed_file.display());

    info!("Connecting to database...");
    let pool = pool::connect_to(&cli.database_url, &cli.database_name, 5, Duration::from_secs(10)).await?;

    let report = Bootstrap::run(&pool, &seed).await?;
    pool.close().await;

    println!("\n=== Bootstrap Summary ===");
    println!("Inserted:        {}", report.inserted);
    println!("Updated:         {}", report.updated);
    println!("Cities in store: {}", report.total_cities);
    println!("✓ Bootstrap complete");

    Ok(())
}
