//! Error types for the census pipeline.

use thiserror::Error;

/// Errors raised while loading credentials, enumerating resources or
/// emitting a report.
#[derive(Error, Debug)]
pub enum CensusError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Transient API error: {0}")]
    Transient(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Could not parse provider output: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl CensusError {
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    pub const fn is_permission(&self) -> bool {
        matches!(self, Self::Permission(_))
    }

    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, CensusError>;
