use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AugmentError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    Store(#[from] object_store::Error),

    #[error("LLM returned error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to load dataset: {0}")]
    Load(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

impl AugmentError {
    /// Whether the retry loop should absorb this failure and try again.
    ///
    /// Transport errors, undecodable bodies, non-2xx statuses and per-attempt
    /// timeouts are transient. A decoded body without a completion won't
    /// improve by asking again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AugmentError::Request(_)
                | AugmentError::Json(_)
                | AugmentError::Status { .. }
                | AugmentError::Timeout(_)
        )
    }
}

impl From<anyhow::Error> for AugmentError {
    fn from(err: anyhow::Error) -> Self {
        AugmentError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AugmentError>;
