use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Database entity models
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct City {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registry input, also the seed-list entry shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityInput {
    pub name: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Numeric readings shared by observations and forecasts
#[derive(Debug, Clone, PartialEq, Default, FromRow, Serialize, Deserialize)]
pub struct WeatherMetrics {
    pub temperature_c: f64,
    #[serde(default)]
    pub humidity_pct: Option<f64>,
    #[serde(default)]
    pub wind_speed_mps: Option<f64>,
    #[serde(default)]
    pub pressure_hpa: Option<f64>,
    #[serde(default)]
    pub precipitation_mm: Option<f64>,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Observation {
    pub id: i64,
    pub city_id: i64,
    pub observed_at: DateTime<Utc>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub metrics: WeatherMetrics,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Forecast {
    pub id: i64,
    pub city_id: i64,
    pub issued_at: DateTime<Utc>,
    pub target_timestamp: DateTime<Utc>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub metrics: WeatherMetrics,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// Per-metric min/max/avg for one city-day. Optional metrics are `None` when
/// no observation that day carried them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub temperature_c: MetricStats,
    pub humidity_pct: Option<MetricStats>,
    pub wind_speed_mps: Option<MetricStats>,
    pub pressure_hpa: Option<MetricStats>,
    pub precipitation_mm: Option<MetricStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalDay {
    pub city_id: i64,
    pub day: NaiveDate,
    pub metrics: DailyMetrics,
    pub sample_count: i64,
    pub first_observed_at: DateTime<Utc>,
    pub last_observed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub(crate) struct HistoricalDayRow {
    pub city_id: i64,
    pub day: NaiveDate,
    pub metrics: sqlx::types::Json<DailyMetrics>,
    pub sample_count: i64,
    pub first_observed_at: DateTime<Utc>,
    pub last_observed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<HistoricalDayRow> for HistoricalDay {
    fn from(row: HistoricalDayRow) -> Self {
        Self {
            city_id: row.city_id,
            day: row.day,
            metrics: row.metrics.0,
            sample_count: row.sample_count,
            first_observed_at: row.first_observed_at,
            last_observed_at: row.last_observed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// API response DTOs (to avoid circular dependency between services and api modules)
#[derive(Debug, Clone, Serialize)]
pub struct CurrentWeather {
    pub city: City,
    pub observation: Observation,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastOutlook {
    pub city: City,
    pub horizon_hours: i64,
    pub forecasts: Vec<Forecast>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeatherHistory {
    pub city: City,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub days: Vec<HistoricalDay>,
}
