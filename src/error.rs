// src/error.rs
use std::io;
use thiserror::Error;

/// Result type used throughout the metron library
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Custom Error type for the metron library
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Send error: {0}")]
    Send(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl MetricsError {
    /// Build a configuration error that names the offending key
    pub fn config_key(key: &str, reason: impl std::fmt::Display) -> Self {
        MetricsError::Config(format!("{}: {}", key, reason))
    }
}
