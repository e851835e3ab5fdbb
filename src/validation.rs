//! Input checks shared by the registry and the stores.
//!
//! Each function either returns a normalised value or a
//! [`WeatherError::Validation`] naming the offending field.

use chrono_tz::Tz;

use crate::db::{CityInput, WeatherMetrics};
use crate::error::WeatherError;

/// Validate a registry entry and normalise it (trimmed name, upper-case country).
///
/// # Examples
///
/// ```
/// use weatherwise_service::db::CityInput;
/// use weatherwise_service::validation::validate_city;
///
/// let city = validate_city(&CityInput {
///     name: " Recife ".to_string(),
///     country: "br".to_string(),
///     latitude: -8.0476,
///     longitude: -34.877,
///     timezone: "America/Recife".to_string(),
///     active: true,
/// })
/// .unwrap();
/// assert_eq!(city.name, "Recife");
/// assert_eq!(city.country, "BR");
/// ```
pub fn validate_city(input: &CityInput) -> Result<CityInput, WeatherError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(invalid("city name must not be empty"));
    }

    let country = normalize_country(&input.country)?;
    validate_coordinates(input.latitude, input.longitude)?;
    validate_timezone(&input.timezone)?;

    Ok(CityInput {
        name: name.to_string(),
        country,
        latitude: input.latitude,
        longitude: input.longitude,
        timezone: input.timezone.trim().to_string(),
        active: input.active,
    })
}

/// Two ASCII letters, returned upper-cased
pub fn normalize_country(country: &str) -> Result<String, WeatherError> {
    let country = country.trim();
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid(format!(
            "country must be a 2-letter code, got {country:?}"
        )));
    }
    Ok(country.to_ascii_uppercase())
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), WeatherError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(invalid(format!("latitude {latitude} outside -90..90")));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(invalid(format!("longitude {longitude} outside -180..180")));
    }
    Ok(())
}

pub fn validate_timezone(timezone: &str) -> Result<Tz, WeatherError> {
    timezone
        .trim()
        .parse::<Tz>()
        .map_err(|_| invalid(format!("unknown IANA timezone {timezone:?}")))
}

pub fn validate_metrics(metrics: &WeatherMetrics) -> Result<(), WeatherError> {
    if !metrics.temperature_c.is_finite() {
        return Err(invalid("temperature_c must be a finite number"));
    }
    check_optional("humidity_pct", metrics.humidity_pct, 0.0, 100.0)?;
    check_optional("wind_speed_mps", metrics.wind_speed_mps, 0.0, f64::MAX)?;
    check_optional("pressure_hpa", metrics.pressure_hpa, 0.0, f64::MAX)?;
    check_optional("precipitation_mm", metrics.precipitation_mm, 0.0, f64::MAX)?;
    Ok(())
}

pub fn validate_source(source: &str) -> Result<String, WeatherError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(invalid("source tag must not be empty"));
    }
    Ok(source.to_string())
}

fn check_optional(field: &str, value: Option<f64>, min: f64, max: f64) -> Result<(), WeatherError> {
    match value {
        Some(v) if !v.is_finite() || v < min || v > max => {
            Err(invalid(format!("{field} value {v} out of range")))
        }
        _ => Ok(()),
    }
}

fn invalid(message: impl Into<String>) -> WeatherError {
    WeatherError::Validation(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fortaleza() -> CityInput {
        CityInput {
            name: "Fortaleza".to_string(),
            country: "BR".to_string(),
            latitude: -3.7172,
            longitude: -38.5433,
            timezone: "America/Fortaleza".to_string(),
            active: true,
        }
    }

    #[test]
    fn test_valid_city_passes() {
        assert_eq!(validate_city(&fortaleza()).unwrap(), fortaleza());
    }

    #[test]
    fn test_empty_name_rejected() {
        let city = CityInput {
            name: "   ".to_string(),
            ..fortaleza()
        };
        assert!(matches!(validate_city(&city), Err(WeatherError::Validation(_))));
    }

    #[test]
    fn test_country_must_be_two_letters() {
        assert!(normalize_country("BRA").is_err());
        assert!(normalize_country("").is_err());
        assert!(normalize_country("B1").is_err());
        assert_eq!(normalize_country("br").unwrap(), "BR");
    }

    #[test]
    fn test_latitude_out_of_range() {
        let city = CityInput {
            latitude: 90.5,
            ..fortaleza()
        };
        assert!(validate_city(&city).is_err());
    }

    #[test]
    fn test_longitude_out_of_range() {
        let city = CityInput {
            longitude: -180.01,
            ..fortaleza()
        };
        assert!(validate_city(&city).is_err());
    }

    #[test]
    fn test_nan_coordinates_rejected() {
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
        assert!(validate_coordinates(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_coordinate_bounds_inclusive() {
        assert!(validate_coordinates(-90.0, 180.0).is_ok());
        assert!(validate_coordinates(90.0, -180.0).is_ok());
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let city = CityInput {
            timezone: "America/Atlantis".to_string(),
            ..fortaleza()
        };
        assert!(validate_city(&city).is_err());
    }

    #[test]
    fn test_metrics_ranges() {
        let ok = WeatherMetrics {
            temperature_c: 30.0,
            humidity_pct: Some(80.0),
            wind_speed_mps: Some(4.2),
            ..Default::default()
        };
        assert!(validate_metrics(&ok).is_ok());

        let bad_humidity = WeatherMetrics {
            humidity_pct: Some(101.0),
            ..ok.clone()
        };
        assert!(validate_metrics(&bad_humidity).is_err());

        let bad_wind = WeatherMetrics {
            wind_speed_mps: Some(-1.0),
            ..ok.clone()
        };
        assert!(validate_metrics(&bad_wind).is_err());

        let bad_temp = WeatherMetrics {
            temperature_c: f64::NAN,
            ..ok
        };
        assert!(validate_metrics(&bad_temp).is_err());
    }

    #[test]
    fn test_source_trimmed() {
        assert_eq!(validate_source(" openweather ").unwrap(), "openweather");
        assert!(validate_source("").is_err());
    }
}
