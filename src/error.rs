use chrono::NaiveDate;

use crate::db::DbError;

/// Errors surfaced by the registry, the stores and the aggregator.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    /// Malformed input. Reported to the caller, never treated as a storage fault.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Lookup miss. An expected outcome, not logged as an error.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Aggregation requested for a valid city/day that has no observations
    #[error("No observations for city {city_id} on {day}")]
    NoData { city_id: i64, day: NaiveDate },

    #[error("City {0} is still referenced by stored weather records")]
    CityReferenced(i64),

    /// Connectivity or timeout against the store. Safe to retry.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error(transparent)]
    Store(DbError),
}

impl WeatherError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, WeatherError::StoreUnavailable(_))
    }
}

impl From<DbError> for WeatherError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::SqlxError(e) if is_unavailable(&e) => {
                WeatherError::StoreUnavailable(e.to_string())
            }
            other => WeatherError::Store(other),
        }
    }
}

impl From<sqlx::Error> for WeatherError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

fn is_unavailable(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_)
    )
}
