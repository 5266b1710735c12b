//! Retry operations with exponential backoff
//!
//! This module runs an async operation until it succeeds, fails with an error
//! the [`policy`](crate::policy) does not consider retryable, runs out of
//! retries, or is cancelled. Features include:
//!
//! - Configurable retry counts and backoff parameters
//! - Exponential delay with jitter between attempts
//! - Status-code driven retry decisions (429 always, others opt-in)
//! - Lifecycle callbacks fired in attempt order
//! - Cancellation of the in-flight attempt or the pending delay
//!
//! Only one attempt runs at a time for a logical call. The only suspension
//! point besides the attempt itself is the backoff wait.

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::compute_delay;
use crate::error::ClientError;
use crate::policy::{should_retry, Classify};

/// Configuration for the exponential backoff retry strategy
///
/// Controls how many retries are made, how long to wait between them and
/// which failures qualify for a retry at all.
///
/// # Examples
///
/// ```
/// use advisor_client::retry::RetryConfig;
///
/// // Default configuration: 5 retries, 1s base, 30s cap, ±25% jitter, 429 only
/// let default_config = RetryConfig::default();
/// assert_eq!(default_config.total_attempts(), 6);
///
/// // Also retry on gateway errors
/// let custom_config = RetryConfig {
///     max_retries: 3,
///     retryable_status_codes: [429, 502, 503].into_iter().collect(),
///     ..Default::default()
/// };
/// assert!(custom_config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,

    /// Upper bound for any delay, in milliseconds
    pub max_delay_ms: u64,

    /// Fraction of the delay used as the random jitter band, in `[0, 1]`
    pub jitter_factor: f64,

    /// Status codes that trigger a retry (429 is retried regardless)
    pub retryable_status_codes: BTreeSet<u16>,

    /// Whether transport failures (connect errors, timeouts) are retried
    pub retry_network_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000, // 30 seconds
            jitter_factor: 0.25,
            retryable_status_codes: BTreeSet::from([429]),
            retry_network_errors: false,
        }
    }
}

impl RetryConfig {
    /// Fewer, slower retries for requests a user is actively waiting on
    pub fn conservative() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 2000,
            max_delay_ms: 10_000,
            ..Self::default()
        }
    }

    /// Total number of times the operation may be invoked
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Checks that the backoff parameters are usable
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.base_delay_ms == 0 {
            return Err(ClientError::InvalidConfig(
                "base_delay_ms must be positive".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ClientError::InvalidConfig(format!(
                "max_delay_ms ({}) must not be below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ClientError::InvalidConfig(format!(
                "jitter_factor ({}) must be within [0, 1]",
                self.jitter_factor
            )));
        }
        Ok(())
    }
}

/// Result of a single attempt, classified against a [`RetryConfig`]
#[derive(Debug)]
pub enum AttemptOutcome<T, E> {
    Success(T),
    RetryableFailure { error: E, attempt: u32 },
    FatalFailure(E),
}

impl<T, E: Classify> AttemptOutcome<T, E> {
    pub fn classify(result: Result<T, E>, attempt: u32, config: &RetryConfig) -> Self {
        match result {
            Ok(value) => AttemptOutcome::Success(value),
            Err(error) if should_retry(error.failure(), config) => {
                AttemptOutcome::RetryableFailure { error, attempt }
            }
            Err(error) => AttemptOutcome::FatalFailure(error),
        }
    }
}

/// Why a retried operation ultimately failed
///
/// Every variant keeps the original error (if any) so callers can still
/// inspect status codes.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The error was not retryable
    #[error("{error}")]
    Permanent { error: E, attempts: u32 },

    /// Every allowed attempt failed with a retryable error
    #[error("{error} (gave up after {attempts} attempts)")]
    Exhausted { error: E, attempts: u32 },

    /// The caller cancelled the operation
    #[error("retry cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32, last_error: Option<E> },
}

impl<E> RetryError<E> {
    /// Number of times the operation was invoked
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Permanent { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// The last error returned by the operation
    pub fn error(&self) -> Option<&E> {
        match self {
            RetryError::Permanent { error, .. } | RetryError::Exhausted { error, .. } => Some(error),
            RetryError::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Permanent { error, .. } | RetryError::Exhausted { error, .. } => Some(error),
            RetryError::Cancelled { last_error, .. } => last_error,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// Lifecycle hooks invoked by the executor
///
/// Hooks run on the executor's task, one at a time, in attempt order.
pub trait RetryObserver<E>: Send + Sync {
    /// Called before waiting `delay` after failed attempt `attempt` (0-based)
    fn on_retry(&self, _attempt: u32, _delay: Duration, _error: &E) {}

    /// Called once when the executor gives up, with the total attempt count
    fn on_max_retries_exceeded(&self, _error: &E, _attempts: u32) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl<E> RetryObserver<E> for NoopObserver {}

type RetryHook<E> = Box<dyn Fn(u32, Duration, &E) + Send + Sync>;
type ExhaustedHook<E> = Box<dyn Fn(&E, u32) + Send + Sync>;

/// Closure-based observer
///
/// # Examples
///
/// ```
/// use advisor_client::retry::RetryCallbacks;
/// use reqwest::StatusCode;
///
/// let callbacks = RetryCallbacks::<StatusCode>::new()
///     .on_retry(|attempt, delay, status| println!("attempt {attempt} got {status}, waiting {delay:?}"))
///     .on_max_retries_exceeded(|status, attempts| eprintln!("gave up after {attempts}: {status}"));
/// ```
pub struct RetryCallbacks<E> {
    on_retry: Option<RetryHook<E>>,
    on_max_retries_exceeded: Option<ExhaustedHook<E>>,
}

impl<E> Default for RetryCallbacks<E> {
    fn default() -> Self {
        Self {
            on_retry: None,
            on_max_retries_exceeded: None,
        }
    }
}

impl<E> RetryCallbacks<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_retry(mut self, f: impl Fn(u32, Duration, &E) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Box::new(f));
        self
    }

    pub fn on_max_retries_exceeded(mut self, f: impl Fn(&E, u32) + Send + Sync + 'static) -> Self {
        self.on_max_retries_exceeded = Some(Box::new(f));
        self
    }
}

impl<E> RetryObserver<E> for RetryCallbacks<E> {
    fn on_retry(&self, attempt: u32, delay: Duration, error: &E) {
        if let Some(f) = &self.on_retry {
            f(attempt, delay, error);
        }
    }

    fn on_max_retries_exceeded(&self, error: &E, attempts: u32) {
        if let Some(f) = &self.on_max_retries_exceeded {
            f(error, attempts);
        }
    }
}

/// Retryable operation executor
///
/// # Examples
///
/// ```
/// use advisor_client::retry::{Retry, RetryConfig};
/// use reqwest::StatusCode;
///
/// # async fn example() {
/// let config = RetryConfig { base_delay_ms: 10, ..Default::default() };
/// let result = Retry::new(&config)
///     .seed(7)
///     .run(|| async { Ok::<_, StatusCode>("programmes") })
///     .await;
/// assert_eq!(result.unwrap(), "programmes");
/// # }
/// ```
pub struct Retry<'a, E> {
    config: &'a RetryConfig,
    observer: &'a dyn RetryObserver<E>,
    cancel: Option<CancellationToken>,
    rng: StdRng,
}

impl<'a, E> Retry<'a, E>
where
    E: Classify + Display,
{
    pub fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            observer: &NoopObserver,
            cancel: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn observer(mut self, observer: &'a dyn RetryObserver<E>) -> Self {
        self.observer = observer;
        self
    }

    /// Aborts the run (in-flight attempt or pending delay) once `token` fires
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Uses `rng` as the jitter source
    pub fn rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Seeds the jitter source for reproducible delays
    pub fn seed(self, seed: u64) -> Self {
        self.rng(StdRng::seed_from_u64(seed))
    }

    /// Runs `operation` until it succeeds or the executor gives up
    ///
    /// # Returns
    /// * `Ok(T)` - The first successful result
    /// * `Err(RetryError)` - The last error, tagged with why the executor stopped
    pub async fn run<F, Fut, T>(mut self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let total = self.config.total_attempts();
        let mut attempt: u32 = 0;
        let mut last_error: Option<E> = None;

        loop {
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                debug!("Cancelled before attempt {}/{}", attempt + 1, total);
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last_error,
                });
            }

            debug!("Attempt {}/{}", attempt + 1, total);

            let result = match or_cancel(operation(), self.cancel.as_ref()).await {
                Some(result) => result,
                None => {
                    debug!("Attempt {}/{} cancelled in flight", attempt + 1, total);
                    return Err(RetryError::Cancelled {
                        attempts: attempt + 1,
                        last_error,
                    });
                }
            };

            match AttemptOutcome::classify(result, attempt, self.config) {
                AttemptOutcome::Success(value) => {
                    if attempt > 0 {
                        debug!("Succeeded on attempt {}/{}", attempt + 1, total);
                    }
                    return Ok(value);
                }
                AttemptOutcome::FatalFailure(error) => {
                    let attempts = attempt + 1;
                    info!("Non-retriable failure on attempt {}/{}: {}", attempts, total, error);
                    self.observer.on_max_retries_exceeded(&error, attempts);
                    return Err(RetryError::Permanent { error, attempts });
                }
                AttemptOutcome::RetryableFailure { error, attempt } if attempt >= self.config.max_retries => {
                    let attempts = attempt + 1;
                    warn!("Giving up after {} attempts: {}", attempts, error);
                    self.observer.on_max_retries_exceeded(&error, attempts);
                    return Err(RetryError::Exhausted { error, attempts });
                }
                AttemptOutcome::RetryableFailure { error, attempt } => {
                    let delay = compute_delay(attempt, self.config, &mut self.rng);
                    warn!(
                        "Attempt {}/{} failed, retrying in {}ms: {}",
                        attempt + 1,
                        total,
                        delay.as_millis(),
                        error
                    );
                    self.observer.on_retry(attempt, delay, &error);
                    last_error = Some(error);

                    if !wait_or_cancel(delay, self.cancel.as_ref()).await {
                        debug!("Backoff wait after attempt {} cancelled", attempt + 1);
                        return Err(RetryError::Cancelled {
                            attempts: attempt + 1,
                            last_error,
                        });
                    }
                }
            }

            attempt += 1;
        }
    }
}

/// Runs `operation` with the default observer, no cancellation and an
/// entropy-seeded jitter source
///
/// # Examples
///
/// ```
/// use advisor_client::retry::{with_exponential_backoff, RetryConfig};
/// use reqwest::StatusCode;
///
/// # async fn example() {
/// let config = RetryConfig::default();
/// let result = with_exponential_backoff(
///     || async { Err::<(), _>(StatusCode::BAD_REQUEST) },
///     &config,
/// )
/// .await;
/// assert_eq!(result.unwrap_err().attempts(), 1);
/// # }
/// ```
pub async fn with_exponential_backoff<F, Fut, T, E>(
    operation: F,
    config: &RetryConfig,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + Display,
{
    Retry::new(config).run(operation).await
}

/// Polls `fut` unless `cancel` fires first
async fn or_cancel<Fut: Future>(fut: Fut, cancel: Option<&CancellationToken>) -> Option<Fut::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => None,
            out = fut => Some(out),
        },
        None => Some(fut.await),
    }
}

/// Sleeps for `delay`; returns false if cancelled first
async fn wait_or_cancel(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    or_cancel(sleep(delay), cancel).await.is_some()
}
