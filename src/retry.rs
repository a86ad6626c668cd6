//! Bounded exponential backoff for single remote calls.
//!
//! Both the GitHub and the Gerrit client run every effect through
//! [`retry_with_backoff`]. Whether an effect may be repeated at all is decided
//! per effect: a call that creates something (a pull request, a comment) is
//! sent once, because a timeout does not tell us whether the server already
//! acted on it.
//!
//! Default: 3 retries with 2s, 4s, 8s delays. Polling loops in
//! [`crate::worker::poll`] sit on top and keep going after a call finally
//! fails.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// An error that knows whether repeating the call could help.
pub trait Retriable: fmt::Display {
    fn is_transient(&self) -> bool;
}

/// Delays between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,

    pub initial_delay: Duration,

    /// Cap for the exponential growth.
    pub max_delay: Duration,

    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// 3 retries with 2s, 4s and 8s delays, ~14 seconds in total.
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(16),
        backoff_multiplier: 2.0,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    /// `attempt` is 0-indexed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }

    pub fn total_max_wait(&self) -> Duration {
        self.delays().sum()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Whether a particular call may be repeated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Repeat transient failures with backoff.
    #[default]
    RetryTransient,

    /// One attempt only.
    NoRetry,
}

impl RetryPolicy {
    /// Repeating a call is only safe if doing it twice has the same effect as
    /// doing it once.
    pub fn for_idempotence(idempotent: bool) -> Self {
        if idempotent {
            RetryPolicy::RetryTransient
        } else {
            RetryPolicy::NoRetry
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, or runs out of
/// attempts. The last error is returned.
///
/// `call` names the operation in logs.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: RetryConfig,
    policy: RetryPolicy,
    call: &'static str,
    mut operation: F,
) -> Result<T, E>
where
    E: Retriable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = match policy {
        RetryPolicy::NoRetry => 1,
        RetryPolicy::RetryTransient => config.max_retries + 1,
    };
    let mut attempt = 0;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        attempt += 1;

        if !error.is_transient() {
            return Err(error);
        }
        if attempt >= max_attempts {
            if max_attempts > 1 {
                warn!(call, attempts = attempt, error = %error, "Giving up after retries");
            }
            return Err(error);
        }

        let delay = config.delay_for_attempt(attempt - 1);
        debug!(
            call,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient error, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
