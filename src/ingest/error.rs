// src/ingest/error.rs
use thiserror::Error;

/// Network-level failure for one source. Always recovered at the source level.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {endpoint}")]
    Timeout { endpoint: String },
    #[error("{endpoint} answered with HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid header `{name}` for {endpoint}")]
    InvalidHeader { endpoint: String, name: String },
}

impl FetchError {
    pub fn endpoint(&self) -> &str {
        match self {
            FetchError::Timeout { endpoint }
            | FetchError::Status { endpoint, .. }
            | FetchError::Transport { endpoint, .. }
            | FetchError::InvalidHeader { endpoint, .. } => endpoint,
        }
    }

    pub(crate) fn from_reqwest(endpoint: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else if let Some(status) = e.status() {
            FetchError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            }
        } else {
            FetchError::Transport {
                endpoint: endpoint.to_string(),
                source: e,
            }
        }
    }
}

/// Extraction failure. `Item` is scoped to a single record; the others void
/// the whole response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("malformed {format} response: {reason}")]
    Malformed { format: &'static str, reason: String },
    #[error("invalid selector `{selector}`")]
    InvalidSelector { selector: String },
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
    #[error("item {index} skipped: {reason}")]
    Item { index: usize, reason: String },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Request-level misconfiguration, surfaced to the caller and never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no endpoint supplied")]
    MissingEndpoint,
    #[error("unknown source `{0}`")]
    UnknownSource(String),
    #[error("no selectors supplied and no document source registered")]
    NoDefaultSelectors,
}
