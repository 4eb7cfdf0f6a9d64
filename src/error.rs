//! Error types shared across the pipeline.

use thiserror::Error;

/// Transient failure while retrieving a page. Every variant is retryable.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {0}")]
    Timeout(String),

    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
}

impl FetchError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(url.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Navigation {
                url: url.to_string(),
                message: format!("HTTP {}", status),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Failure to keep durable state in sync. Always fatal to a run.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PersistResult<T> = std::result::Result<T, PersistenceError>;
