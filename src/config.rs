use std::env;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("Environment variable {name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub database_name: String,
    pub database_max_connections: u32,
    pub database_acquire_timeout_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub seed_file: PathBuf,
    pub clock_skew_tolerance_secs: i64,
    pub retention_purge_interval_minutes: u64,
    pub aggregation_interval_minutes: u64,
    pub cors_allow_origins: String,
}

impl Config {
    /// Load from the process environment. A missing connection string or
    /// database name is fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            database_name: required("DATABASE_NAME")?,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            database_acquire_timeout_secs: parse_or(&lookup, "DATABASE_ACQUIRE_TIMEOUT_SECS", 5)?,
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parse_or(&lookup, "SERVER_PORT", 8080)?,
            seed_file: lookup("SEED_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config/cities.toml")),
            clock_skew_tolerance_secs: parse_or(&lookup, "CLOCK_SKEW_TOLERANCE_SECS", 300)?,
            retention_purge_interval_minutes: parse_interval(
                &lookup,
                "RETENTION_PURGE_INTERVAL_MINUTES",
                60,
            )?,
            aggregation_interval_minutes: parse_interval(&lookup, "AGGREGATION_INTERVAL_MINUTES", 30)?,
            cors_allow_origins: lookup("CORS_ALLOW_ORIGINS").unwrap_or_else(|| "*".to_string()),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

// Scheduler periods must be non-zero
fn parse_interval<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, name, default)? {
        0 => Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
        }),
        minutes => Ok(minutes),
    }
}

/// Mask the password in a connection string, if it carries one
fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let authority_start = scheme_end + 3;
    let authority_end = url[authority_start..]
        .find('/')
        .map_or(url.len(), |i| authority_start + i);

    let Some(at) = url[authority_start..authority_end].rfind('@') else {
        return url.to_string();
    };
    let userinfo = &url[authority_start..authority_start + at];

    match userinfo.find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &url[..authority_start],
            &userinfo[..colon],
            &url[authority_start + at..]
        ),
        None => url.to_string(),
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &redact_url(&self.database_url))
            .field("database_name", &self.database_name)
            .field("database_max_connections", &self.database_max_connections)
            .field("database_acquire_timeout_secs", &self.database_acquire_timeout_secs)
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("seed_file", &self.seed_file)
            .field("clock_skew_tolerance_secs", &self.clock_skew_tolerance_secs)
            .field("retention_purge_interval_minutes", &self.retention_purge_interval_minutes)
            .field("aggregation_interval_minutes", &self.aggregation_interval_minutes)
            .field("cors_allow_origins", &self.cors_allow_origins)
            .finish()
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
