//! Error types for Kilns.

use thiserror::Error;

/// Library-level error type for Kilns operations.
#[derive(Error, Debug)]
pub enum KilnsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query expansion failed: {0}")]
    Expansion(String),

    #[error("Query expansion timed out after {0}s")]
    ExpansionTimeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),
}

impl KilnsError {
    /// Whether this error originated in the persistence layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, KilnsError::Storage(_) | KilnsError::Database(_))
    }
}

/// Result type alias for Kilns operations.
pub type Result<T> = std::result::Result<T, KilnsError>;
