use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::TryStreamExt;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, error, info, instrument, warn};

use crate::db::{
    City, CityInput, CurrentWeather, Forecast, ForecastOutlook, HistoricalDay, Observation,
    UpsertOutcome, WeatherHistory, WeatherMetrics,
};
use crate::error::WeatherError;
use crate::services::{
    CityRegistry, CityUpsert, ForecastStore, HistoricalAggregator, ObservationStore, WeatherService,
};

#[derive(Clone)]
pub struct AppState {
    pub weather_service: WeatherService,
    pub registry: CityRegistry,
    pub observations: ObservationStore,
    pub forecasts: ForecastStore,
    pub history: HistoricalAggregator,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// HTTP view of [`WeatherError`]
#[derive(Debug)]
pub struct ApiError(pub WeatherError);

impl From<WeatherError> for ApiError {
    fn from(err: WeatherError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            WeatherError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            WeatherError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            WeatherError::NoData { .. } => (StatusCode::NOT_FOUND, "no_data"),
            WeatherError::CityReferenced(_) => (StatusCode::CONFLICT, "city_referenced"),
            WeatherError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
            WeatherError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        };

        match status {
            StatusCode::NOT_FOUND => debug!("{}", self.0),
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT => warn!("{}", self.0),
            _ => error!("{}", self.0),
        }

        let body = ErrorResponse {
            error: code.to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CityQuery {
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub country: Option<String>,
    pub hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub country: Option<String>,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ListCitiesQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct CoordinatesRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct RecordObservationRequest {
    pub city_id: i64,
    pub observed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub metrics: WeatherMetrics,
    pub source: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordForecastRequest {
    pub city_id: i64,
    pub issued_at: DateTime<Utc>,
    pub target_timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub metrics: WeatherMetrics,
    pub source: String,
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/cities", get(list_cities).post(upsert_city))
        .route("/cities/{id}", get(get_city).delete(delete_city))
        .route("/cities/{id}/deactivate", post(deactivate_city))
        .route("/cities/{id}/coordinates", put(update_coordinates))
        .route("/weather/current/{city}", get(get_current))
        .route("/weather/forecast/{city}", get(get_forecast))
        .route("/weather/history/{city}", get(get_history))
        .route("/observations", post(record_observation))
        .route("/forecasts", post(record_forecast))
        .route("/history/{city_id}/{day}/aggregate", post(aggregate_day))
        .with_state(state);

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", api_routes)
}

/// `*` allows any origin; otherwise a comma-separated origin list
pub fn cors_layer(allow_origins: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allow_origins.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allow_origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

async fn root() -> impl IntoResponse {
    Json(RootResponse {
        message: "WeatherWise API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
    })
}

#[instrument(skip(_state))]
async fn health(State(_state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");
    let response = HealthResponse {
        status: "healthy".to_string(),
    };
    (StatusCode::OK, Json(response))
}

#[instrument(skip(state))]
async fn list_cities(
    State(state): State<AppState>,
    Query(params): Query<ListCitiesQuery>,
) -> Result<Json<Vec<City>>, ApiError> {
    let cities: Vec<City> = state.registry.list(params.active_only).try_collect().await?;
    info!("Listed {} cities (active_only={})", cities.len(), params.active_only);
    Ok(Json(cities))
}

#[instrument(skip(state, input), fields(name = %input.name, country = %input.country))]
async fn upsert_city(
    State(state): State<AppState>,
    Json(input): Json<CityInput>,
) -> Result<(StatusCode, Json<CityUpsert>), ApiError> {
    let upserted = state.registry.upsert(&input).await?;
    let status = match upserted.outcome {
        UpsertOutcome::Inserted => StatusCode::CREATED,
        UpsertOutcome::Updated => StatusCode::OK,
    };
    Ok((status, Json(upserted)))
}

#[instrument(skip(state))]
async fn get_city(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<City>, ApiError> {
    Ok(Json(state.registry.find_by_id(id).await?))
}

#[instrument(skip(state))]
async fn deactivate_city(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<City>, ApiError> {
    let city = state.registry.deactivate(id).await?;
    info!("Deactivated city {} ({})", city.id, city.name);
    Ok(Json(city))
}

#[instrument(skip(state, body))]
async fn update_coordinates(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<CoordinatesRequest>,
) -> Result<Json<City>, ApiError> {
    let city = state
        .registry
        .update_coordinates(id, body.latitude, body.longitude)
        .await?;
    Ok(Json(city))
}

#[instrument(skip(state))]
async fn delete_city(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.registry.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state), fields(city = %city))]
async fn get_current(
    State(state): State<AppState>,
    Path(city): Path<String>,
    Query(params): Query<CityQuery>,
) -> Result<Json<CurrentWeather>, ApiError> {
    debug!("Fetching current weather for {}", city);
    let current = state
        .weather_service
        .get_current(&city, params.country.as_deref())
        .await?;

    info!(
        "Retrieved current weather for {} from {}",
        current.city.name, current.observation.observed_at
    );
    Ok(Json(current))
}

#[instrument(skip(state), fields(city = %city))]
async fn get_forecast(
    State(state): State<AppState>,
    Path(city): Path<String>,
    Query(params): Query<ForecastQuery>,
) -> Result<Json<ForecastOutlook>, ApiError> {
    let outlook = state
        .weather_service
        .get_forecast(&city, params.country.as_deref(), params.hours)
        .await?;

    info!(
        "Retrieved {} forecasts for {} over {}h",
        outlook.forecasts.len(),
        outlook.city.name,
        outlook.horizon_hours
    );
    Ok(Json(outlook))
}

#[instrument(skip(state), fields(city = %city))]
async fn get_history(
    State(state): State<AppState>,
    Path(city): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<WeatherHistory>, ApiError> {
    let history = state
        .weather_service
        .get_history(&city, params.country.as_deref(), params.from, params.to)
        .await?;

    info!(
        "Retrieved {} historical days for {}",
        history.days.len(),
        history.city.name
    );
    Ok(Json(history))
}

#[instrument(skip(state, body), fields(city_id = body.city_id))]
async fn record_observation(
    State(state): State<AppState>,
    Json(body): Json<RecordObservationRequest>,
) -> Result<Json<Observation>, ApiError> {
    let observation = state
        .observations
        .record(body.city_id, body.observed_at, &body.metrics, &body.source)
        .await?;
    Ok(Json(observation))
}

#[instrument(skip(state, body), fields(city_id = body.city_id))]
async fn record_forecast(
    State(state): State<AppState>,
    Json(body): Json<RecordForecastRequest>,
) -> Result<(StatusCode, Json<Forecast>), ApiError> {
    let forecast = state
        .forecasts
        .record(
            body.city_id,
            body.issued_at,
            body.target_timestamp,
            &body.metrics,
            &body.source,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(forecast)))
}

#[instrument(skip(state))]
async fn aggregate_day(
    State(state): State<AppState>,
    Path((city_id, day)): Path<(i64, NaiveDate)>,
) -> Result<Json<HistoricalDay>, ApiError> {
    Ok(Json(state.history.aggregate_day(city_id, day).await?))
}
