pub mod city_registry;
pub mod forecast_store;
pub mod historical_aggregator;
pub mod observation_store;
pub mod weather_service;

pub use city_registry::{CityRegistry, CityUpsert};
pub use forecast_store::ForecastStore;
pub use historical_aggregator::HistoricalAggregator;
pub use observation_store::ObservationStore;
pub use weather_service::WeatherService;
