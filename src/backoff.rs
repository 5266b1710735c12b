//! Exponential backoff delay calculation
//!
//! Delays grow as `base_delay_ms * 2^attempt`, are capped at `max_delay_ms`
//! and then perturbed by up to `±jitter_factor` of the capped value. The
//! random source is passed in so tests can seed it.

use rand::Rng;
use std::time::Duration;

use crate::retry::RetryConfig;

/// Returns the unjittered delay in milliseconds for `attempt` (0-based),
/// capped at `max_delay_ms`.
///
/// # Examples
///
/// ```
/// use advisor_client::backoff::backoff_ceiling;
/// use advisor_client::retry::RetryConfig;
///
/// let config = RetryConfig::default();
/// assert_eq!(backoff_ceiling(0, &config), 1000.0);
/// assert_eq!(backoff_ceiling(3, &config), 8000.0);
/// assert_eq!(backoff_ceiling(40, &config), 30000.0);
/// ```
pub fn backoff_ceiling(attempt: u32, config: &RetryConfig) -> f64 {
    // powi overflows to infinity for large attempts, which min() then caps
    let exponential = config.base_delay_ms as f64 * 2f64.powi(attempt.min(i32::MAX as u32) as i32);
    exponential.min(config.max_delay_ms as f64)
}

/// Computes a randomized exponential delay for a given attempt
///
/// The result always lies in `[0, max_delay_ms]`, even when the jitter would
/// push the capped value above the cap. A jitter factor outside `[0, 1]` is
/// clamped into it and a NaN factor means no jitter, so unvalidated configs
/// still produce a usable delay.
///
/// # Arguments
/// * `attempt` - Zero-based attempt index that just failed
/// * `config` - Backoff parameters
/// * `rng` - Random source for the jitter
///
/// # Examples
///
/// ```
/// use advisor_client::backoff::compute_delay;
/// use advisor_client::retry::RetryConfig;
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let config = RetryConfig { base_delay_ms: 1000, max_delay_ms: 5000, ..Default::default() };
/// let mut rng = StdRng::seed_from_u64(7);
/// let delay = compute_delay(10, &config, &mut rng);
/// assert!(delay.as_millis() <= 5000);
/// ```
pub fn compute_delay<R: Rng + ?Sized>(attempt: u32, config: &RetryConfig, rng: &mut R) -> Duration {
    let capped = backoff_ceiling(attempt, config);
    let factor = if config.jitter_factor.is_nan() {
        0.0
    } else {
        config.jitter_factor.clamp(0.0, 1.0)
    };
    let jitter_range = capped * factor;
    let jitter = (rng.gen::<f64>() - 0.5) * 2.0 * jitter_range;

    let delay_ms = (capped + jitter).clamp(0.0, config.max_delay_ms as f64);
    Duration::from_secs_f64(delay_ms / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn config(base: u64, max: u64, jitter: f64) -> RetryConfig {
        RetryConfig {
            base_delay_ms: base,
            max_delay_ms: max,
            jitter_factor: jitter,
            ..Default::default()
        }
    }

    #[test]
    fn ceiling_doubles_until_capped() {
        let cfg = config(100, 1000, 0.0);
        let ceilings: Vec<f64> = (0..6).map(|a| backoff_ceiling(a, &cfg)).collect();
        assert_eq!(ceilings, vec![100.0, 200.0, 400.0, 800.0, 1000.0, 1000.0]);
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let cfg = config(1000, 30_000, 0.25);
        assert_eq!(backoff_ceiling(u32::MAX, &cfg), 30_000.0);
    }

    #[test]
    fn zero_jitter_is_exact() {
        let cfg = config(250, 10_000, 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(compute_delay(2, &cfg, &mut rng), Duration::from_millis(1000));
    }

    #[test]
    fn jitter_stays_within_band() {
        let cfg = config(1000, 30_000, 0.25);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let delay = compute_delay(1, &cfg, &mut rng).as_secs_f64() * 1000.0;
            assert!((1500.0..=2500.0).contains(&delay), "delay {delay} outside ±25% of 2000");
        }
    }

    #[test]
    fn same_seed_same_delays() {
        let cfg = RetryConfig::default();
        let mut a = StdRng::seed_from_u64(99);
        let mut b = StdRng::seed_from_u64(99);
        for attempt in 0..8 {
            assert_eq!(compute_delay(attempt, &cfg, &mut a), compute_delay(attempt, &cfg, &mut b));
        }
    }

    #[test]
    fn non_finite_jitter_is_tamed() {
        let mut rng = StdRng::seed_from_u64(8);
        let nan = config(1000, 30_000, f64::NAN);
        assert_eq!(compute_delay(1, &nan, &mut rng), Duration::from_millis(2000));

        let huge = config(1000, 30_000, f64::INFINITY);
        for _ in 0..50 {
            assert!(compute_delay(1, &huge, &mut rng) <= Duration::from_millis(4000));
        }
    }

    #[test]
    fn jitter_never_exceeds_cap() {
        let cfg = config(1000, 5000, 1.0);
        let mut rng = StdRng::seed_from_u64(3);
        for attempt in 0..20 {
            for _ in 0..50 {
                assert!(compute_delay(attempt, &cfg, &mut rng) <= Duration::from_millis(5000));
            }
        }
    }
}
