//! Error types for the advising API client

use reqwest::StatusCode;
use thiserror::Error;

use crate::policy::{Classify, Failure};
use crate::retry::RetryError;

/// Errors surfaced by [`ApiClient`](crate::http::ApiClient)
///
/// `Status` only shows up for responses that were retried and still failed;
/// a non-retryable error response is handed back to the caller as a
/// response, not as an error.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with an error status inside the retry loop
    #[error("HTTP {status} from {url}")]
    Status { status: StatusCode, url: String },

    /// The request failed below HTTP (connect, timeout, malformed request)
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request body could not be serialized
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    /// Retry parameters are unusable
    #[error("invalid retry configuration: {0}")]
    InvalidConfig(String),

    /// The caller cancelled the request
    #[error("request cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// Every attempt failed; wraps the last failure
    #[error("{error} (gave up after {attempts} attempts)")]
    Exhausted {
        #[source]
        error: Box<ClientError>,
        attempts: u32,
    },
}

impl ClientError {
    /// HTTP status of the underlying failure, if there was one
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Transport { source, .. } => source.status(),
            ClientError::Exhausted { error, .. } => error.status(),
            _ => None,
        }
    }

    /// Number of attempts made, when known
    pub fn attempts(&self) -> Option<u32> {
        match self {
            ClientError::Cancelled { attempts } | ClientError::Exhausted { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled { .. })
    }

    pub fn is_network(&self) -> bool {
        match self {
            ClientError::Exhausted { error, .. } => error.is_network(),
            other => other.failure() == Failure::Network,
        }
    }
}

impl Classify for ClientError {
    fn failure(&self) -> Failure {
        match self {
            ClientError::Status { status, .. } => Failure::Status(status.as_u16()),
            ClientError::Transport { source, .. } => source.failure(),
            ClientError::Exhausted { error, .. } => error.failure(),
            ClientError::Encode(_) | ClientError::InvalidConfig(_) | ClientError::Cancelled { .. } => {
                Failure::Other
            }
        }
    }
}

impl From<RetryError<ClientError>> for ClientError {
    fn from(err: RetryError<ClientError>) -> Self {
        match err {
            RetryError::Permanent { error, .. } => error,
            RetryError::Exhausted { error, attempts } => ClientError::Exhausted {
                error: Box::new(error),
                attempts,
            },
            RetryError::Cancelled { attempts, .. } => ClientError::Cancelled { attempts },
        }
    }
}
