pub mod city_repository;
pub mod error;
pub mod forecast_repository;
pub mod historical_repository;
pub mod models;
pub mod observation_repository;
pub mod pool;
pub mod retention_repository;

pub use city_repository::{CityRepository, DeleteOutcome};
pub use error::DbError;
pub use forecast_repository::ForecastRepository;
pub use historical_repository::{DaySummary, HistoricalRepository};
pub use models::*;
pub use observation_repository::ObservationRepository;
pub use retention_repository::RetentionPolicyRepository;
