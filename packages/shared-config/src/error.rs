//! Configuration error types

use thiserror::Error;

/// Errors surfaced while reading configuration from the environment
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An environment variable held a value that failed to parse
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
