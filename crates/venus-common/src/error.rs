//! Error types shared across the Venus workspace

use thiserror::Error;

/// Result type alias for Venus operations
pub type Result<T> = std::result::Result<T, VenusError>;

/// Main error type for Venus
#[derive(Error, Debug)]
pub enum VenusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<::config::ConfigError> for VenusError {
    fn from(err: ::config::ConfigError) -> Self {
        VenusError::Config(err.to_string())
    }
}
