//! Retry decisions for failed attempts
//!
//! A failure is first reduced to a [`Failure`] (an HTTP status, a transport
//! failure, or anything else) and then judged against a [`RetryConfig`].
//! 429 is always retried; everything else has to be opted into.

use reqwest::StatusCode;

use crate::retry::RetryConfig;

/// What went wrong with an attempt, as far as retrying is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The server answered with this HTTP status
    Status(u16),
    /// The request never got an answer (connect failure, timeout)
    Network,
    /// Anything else: malformed requests, encoding errors, decode errors
    Other,
}

/// Maps an error type onto a [`Failure`] so the executor can judge it
pub trait Classify {
    fn failure(&self) -> Failure;
}

impl Classify for Failure {
    fn failure(&self) -> Failure {
        *self
    }
}

impl Classify for StatusCode {
    fn failure(&self) -> Failure {
        Failure::Status(self.as_u16())
    }
}

impl Classify for reqwest::Error {
    fn failure(&self) -> Failure {
        if self.is_timeout() || self.is_connect() {
            return Failure::Network;
        }
        match self.status() {
            Some(status) => Failure::Status(status.as_u16()),
            None => Failure::Other,
        }
    }
}

/// Decides whether a failed attempt warrants another one
///
/// # Examples
///
/// ```
/// use advisor_client::policy::{should_retry, Failure};
/// use advisor_client::retry::RetryConfig;
///
/// let config = RetryConfig::default();
/// assert!(should_retry(Failure::Status(429), &config));
/// assert!(!should_retry(Failure::Status(400), &config));
/// assert!(!should_retry(Failure::Network, &config));
/// ```
pub fn should_retry(failure: Failure, config: &RetryConfig) -> bool {
    match failure {
        Failure::Status(429) => true,
        Failure::Status(code) if code < 400 => false,
        Failure::Status(code) => config.retryable_status_codes.contains(&code),
        Failure::Network => config.retry_network_errors,
        Failure::Other => false,
    }
}
