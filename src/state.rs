//! Presentation-neutral retry progress
//!
//! [`RetryTracker`] turns executor callbacks into a [`RetryState`] that a UI
//! (or the CLI) can watch. It also owns the cancellation token for the
//! operation it tracks, so "cancel" in the UI maps to one call.

use arc_swap::ArcSwap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::policy::{Classify, Failure};
use crate::retry::RetryObserver;

/// Snapshot of one logical operation's retry progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    pub is_retrying: bool,
    /// Number of failed attempts so far
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub last_status: Option<u16>,
    pub status_message: String,
}

/// Tracks retry progress and publishes it over a watch channel
///
/// # Examples
///
/// ```
/// use advisor_client::state::RetryTracker;
///
/// let tracker = RetryTracker::new(5);
/// let updates = tracker.subscribe();
/// let _token = tracker.start();
/// assert!(updates.borrow().is_retrying);
/// assert_eq!(updates.borrow().status_message, "Loading...");
/// ```
pub struct RetryTracker {
    max_retries: u32,
    state: watch::Sender<RetryState>,
    cancel: ArcSwap<CancellationToken>,
}

impl RetryTracker {
    pub fn new(max_retries: u32) -> Self {
        let (state, _) = watch::channel(RetryState::default());
        Self {
            max_retries,
            state,
            cancel: ArcSwap::from_pointee(CancellationToken::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RetryState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> RetryState {
        self.state.borrow().clone()
    }

    /// Token that cancels the currently tracked operation
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.load().as_ref().clone()
    }

    /// Begins tracking a new operation and returns its cancellation token
    pub fn start(&self) -> CancellationToken {
        let token = CancellationToken::new();
        self.cancel.store(Arc::new(token.clone()));
        let message = self.retry_message(0);
        self.state.send_modify(|s| {
            *s = RetryState {
                is_retrying: true,
                status_message: message,
                ..RetryState::default()
            };
        });
        token
    }

    /// Records that attempt `attempt` (0-based) failed and another follows
    pub fn record_retry(&self, attempt: u32, delay: Duration) {
        let failed = attempt.saturating_add(1).min(self.max_retries.saturating_add(1));
        let message = self.retry_message(failed);
        debug!(
            "Retry {}/{} in {}ms",
            failed,
            self.max_retries.saturating_add(1),
            delay.as_millis()
        );
        self.state.send_modify(|s| {
            s.is_retrying = true;
            s.attempt_count = failed;
            s.status_message = message;
        });
    }

    pub fn succeeded(&self) {
        self.state.send_modify(|s| *s = RetryState::default());
    }

    /// Records the final failure of the tracked operation
    pub fn failed(&self, failure: Failure, error: &str, attempts: u32) {
        let attempts = attempts.min(self.max_retries.saturating_add(1));
        let message = error_message(failure, error);
        self.state.send_modify(|s| {
            s.is_retrying = false;
            s.attempt_count = attempts;
            s.last_error = Some(error.to_string());
            s.last_status = match failure {
                Failure::Status(code) => Some(code),
                _ => None,
            };
            s.status_message = message;
        });
    }

    /// Cancels the tracked operation and clears the state
    pub fn cancel(&self) {
        self.cancel.load().cancel();
        self.succeeded();
    }

    /// Updates the state from the final result of the tracked operation
    ///
    /// A cancelled operation clears the state. Failures that never reached
    /// the executor's exhaustion hook (e.g. a body that could not be encoded)
    /// are recorded here with the attempt count seen so far, which is zero
    /// when no request went out.
    pub fn settle<T, E: Classify + Display>(&self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.succeeded(),
            Err(_) if self.cancel.load().is_cancelled() => self.succeeded(),
            Err(err) => {
                if self.state.borrow().is_retrying {
                    let attempts = self.state.borrow().attempt_count;
                    self.failed(err.failure(), &err.to_string(), attempts);
                }
            }
        }
    }

    /// Progress message for the given number of failed attempts
    pub fn retry_message(&self, attempt: u32) -> String {
        let total = self.max_retries.saturating_add(1);
        if attempt == 0 {
            "Loading...".to_string()
        } else if attempt <= self.max_retries {
            format!("Retrying... ({}/{})", attempt + 1, total)
        } else {
            format!("Request failed after {} attempts", total)
        }
    }
}

impl<E: Classify + Display> RetryObserver<E> for RetryTracker {
    fn on_retry(&self, attempt: u32, delay: Duration, _error: &E) {
        self.record_retry(attempt, delay);
    }

    fn on_max_retries_exceeded(&self, error: &E, attempts: u32) {
        self.failed(error.failure(), &error.to_string(), attempts);
    }
}

/// Human-readable description of a failure
pub fn error_message(failure: Failure, error: &str) -> String {
    match failure {
        Failure::Status(429) => "Too many requests. Please wait a moment and try again.".to_string(),
        Failure::Status(code) if code >= 500 => "Server error. Please try again later.".to_string(),
        Failure::Status(code) if code >= 400 => {
            "Request failed. Please check your input and try again.".to_string()
        }
        Failure::Network => "Network error. Please check your connection and try again.".to_string(),
        _ if error.is_empty() => "An unexpected error occurred.".to_string(),
        _ => error.to_string(),
    }
}
