//! Backoff for writes that lost a compare-and-swap race on a booking.
//!
//! A lost race means someone else committed a newer version between our read
//! and our save. Re-running the whole read-plan-save cycle usually succeeds,
//! so [`BookingService`](crate::BookingService) and the bulk runner wrap their
//! writes in [`retry_with_predicate`] with
//! [`LifecycleError::is_retryable`](medtour_core::LifecycleError::is_retryable)
//! as the predicate. Everything else (illegal transitions, missing bookings,
//! store outages) surfaces on the first attempt.
//!
//! # Example
//!
//! ```rust
//! use medtour_booking::retry::{RetryPolicy, retry_with_predicate};
//! use medtour_core::{BookingId, LifecycleError};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::builder()
//!     .max_retries(2)
//!     .initial_delay(Duration::from_millis(1))
//!     .build();
//!
//! let booking_id = BookingId::new();
//! let mut lost = 0;
//! let saved = retry_with_predicate(
//!     &policy,
//!     || {
//!         lost += 1;
//!         let outcome = if lost == 1 {
//!             Err(LifecycleError::ConcurrentModification { booking_id })
//!         } else {
//!             Ok(booking_id)
//!         };
//!         async move { outcome }
//!     },
//!     LifecycleError::is_retryable,
//! )
//! .await;
//! assert_eq!(saved.ok(), Some(booking_id));
//! # });
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// How often and how patiently a lost race is re-run.
///
/// Defaults: 3 retries, 25ms first pause, doubling, capped at 500ms. A
/// contended booking therefore costs at most about 200ms of waiting before
/// the conflict is reported.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Re-runs after the first attempt
    pub max_retries: usize,
    /// Pause before the first re-run
    pub initial_delay: Duration,
    /// Longest pause between re-runs
    pub max_delay: Duration,
    /// Growth factor of the pause
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Start from the defaults.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// Report the first conflict as is.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::builder().max_retries(0).build()
    }

    /// Pause before re-run number `attempt + 1`.
    ///
    /// `initial_delay * multiplier^attempt`, never above `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let seconds = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(seconds).map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Builder for [`RetryPolicy`]; unset fields keep their defaults.
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Re-runs after the first attempt.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Pause before the first re-run.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Longest pause between re-runs.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Growth factor of the pause.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Finish the policy.
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(3),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(25)),
            max_delay: self.max_delay.unwrap_or(Duration::from_millis(500)),
            multiplier: self.multiplier.unwrap_or(2.0),
        }
    }
}

/// Run `operation`, re-running it while `is_retryable` accepts the error.
///
/// # Errors
///
/// The first error `is_retryable` rejects, or the last error once
/// `policy.max_retries` re-runs are used up.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let mut retries = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::debug!(retries, "Write committed after lost races");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            return Err(err);
        }
        if retries >= policy.max_retries {
            tracing::warn!(retries, error = %err, "Giving up on contended write");
            return Err(err);
        }

        let delay = policy.delay_for_attempt(retries);
        tracing::debug!(
            retry = retries + 1,
            delay_ms = delay.as_millis(),
            error = %err,
            "Re-running lost write"
        );
        sleep(delay).await;
        retries += 1;
    }
}
