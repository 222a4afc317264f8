use thiserror::Error;

/// Common error type for pimon components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid topic: {0}")]
    Topic(String),
}

/// Result type alias using pimon's Error.
pub type Result<T> = std::result::Result<T, Error>;
