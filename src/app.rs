use sqlx::PgPool;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::{cors_layer, create_router, AppState};
use crate::config::Config;
use crate::db::{CityRepository, ForecastRepository, HistoricalRepository, ObservationRepository};
use crate::scheduler;
use crate::services::{
    CityRegistry, ForecastStore, HistoricalAggregator, ObservationStore, WeatherService,
};

/// Build every service over one shared pool.
pub fn build_state(config: &Config, pool: PgPool) -> AppState {
    let city_repo = CityRepository::new(pool.clone());
    let observation_repo = ObservationRepository::new(pool.clone());
    let forecast_repo = ForecastRepository::new(pool.clone());
    let historical_repo = HistoricalRepository::new(pool);

    let registry = CityRegistry::new(city_repo.clone());
    let observations = ObservationStore::new(
        observation_repo.clone(),
        city_repo.clone(),
        config.clock_skew_tolerance_secs,
    );
    let forecasts = ForecastStore::new(forecast_repo, city_repo.clone());
    let history = HistoricalAggregator::new(historical_repo, observation_repo, city_repo);

    let weather_service = WeatherService::new(
        registry.clone(),
        observations.clone(),
        forecasts.clone(),
        history.clone(),
    );

    AppState {
        weather_service,
        registry,
        observations,
        forecasts,
        history,
    }
}

/// Application with all spawned background tasks and server
pub struct Application {
    pool: PgPool,
    pub server_handle: JoinHandle<Result<(), std::io::Error>>,
    pub retention_scheduler_handle: JoinHandle<()>,
    pub aggregation_scheduler_handle: JoinHandle<()>,
}

impl Application {
    /// Build and initialize the application
    ///
    /// This creates all services and spawns:
    /// - HTTP API server (Axum), stopping on Ctrl-C / SIGTERM
    /// - Retention purge scheduler
    /// - Daily aggregation scheduler
    pub async fn build(config: Config, pool: PgPool) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing application components");

        let state = build_state(&config, pool.clone());

        let retention_scheduler_handle = {
            let observations = state.observations.clone();
            let interval = config.retention_purge_interval_minutes;
            tokio::spawn(async move {
                scheduler::start_retention_scheduler(observations, interval).await;
            })
        };

        let aggregation_scheduler_handle = {
            let registry = state.registry.clone();
            let history = state.history.clone();
            let interval = config.aggregation_interval_minutes;
            tokio::spawn(async move {
                scheduler::start_aggregation_scheduler(registry, history, interval).await;
            })
        };

        let app = create_router(state)
            .layer(cors_layer(&config.cors_allow_origins))
            .layer(TraceLayer::new_for_http());

        let addr = config.server_addr();
        info!("Starting HTTP server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;

        let server_handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
        });

        info!("Application initialized successfully");

        Ok(Self {
            pool,
            server_handle,
            retention_scheduler_handle,
            aggregation_scheduler_handle,
        })
    }

    /// Run until the server stops, then stop background tasks and close the pool.
    pub async fn run_until_stopped(self) -> Result<(), Box<dyn std::error::Error>> {
        let result = self.server_handle.await;

        self.retention_scheduler_handle.abort();
        self.aggregation_scheduler_handle.abort();

        info!("Closing database pool");
        self.pool.close().await;

        result??;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
