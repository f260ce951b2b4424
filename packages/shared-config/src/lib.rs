//! Environment-driven configuration shared by Chorus services
//!
//! Every service loads a `CommonConfig` at startup and layers its own
//! settings on top. Values come from environment variables with
//! development-friendly defaults; production hardening (required
//! variables, no insecure fallbacks) lives in each service's own config.

mod database;
mod error;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ConfigResult};

use std::env;

/// Configuration every Chorus service needs
#[derive(Debug, Clone)]
pub struct CommonConfig {
    /// Record-store connection settings
    pub database: DatabaseConfig,

    /// Deployment environment
    pub environment: Environment,

    /// Tracing filter directive used when RUST_LOG is not set
    pub log_level: String,
}

impl CommonConfig {
    /// Load common configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            database: DatabaseConfig::from_env()?,
            environment: Environment::current(),
            log_level: env_or("LOG_LEVEL", "debug"),
        })
    }
}

/// Deployment environment, read from the ENVIRONMENT variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Read ENVIRONMENT, defaulting to development. Unrecognized values
    /// fall back to development rather than refusing to boot.
    pub fn current() -> Self {
        match env::var("ENVIRONMENT") {
            Ok(value) => Self::parse(&value),
            Err(_) => Self::Development,
        }
    }

    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read an environment variable, falling back to a default when unset
pub fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable into `T`, falling back to a default
/// when unset. A set-but-unparseable value is an error, not a fallback.
pub fn parse_env_or<T>(name: &str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value.parse().map_err(|e| ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("{}", e),
        }),
        Err(_) => Ok(default),
    }
}
