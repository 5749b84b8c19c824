// src/error.rs
// Crate-wide error type

use thiserror::Error;

/// Main error type for the engram library.
#[derive(Error, Debug)]
pub enum EngramError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("schema version mismatch: db is at {found}, binary expects {expected}")]
    SchemaMismatch { found: i64, expected: i64 },

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngramError>;

impl From<String> for EngramError {
    fn from(s: String) -> Self {
        EngramError::Other(s)
    }
}

impl From<tokio::task::JoinError> for EngramError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            EngramError::Cancelled
        } else {
            EngramError::Other(err.to_string())
        }
    }
}
