//! Retry policy shared by the page fetcher, the category crawler and the
//! notification dispatcher.
//!
//! [`RetryPolicy::run`] wraps any fallible async operation. The caller decides
//! which errors are worth another attempt; anything else is returned
//! immediately.

use std::future::Future;
use std::time::Duration;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

/// The last error of a retried operation and how many attempts were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub source: E,
}

impl RetryPolicy {
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(delay),
        }
    }

    #[must_use]
    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Exponential { base, max },
        }
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Delay to wait after the given (1-based) failed attempt.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 1u32 << attempt.saturating_sub(1).min(16);
                base.saturating_mul(factor).min(max)
            }
        }
    }

    /// Run `operation` until it succeeds, returns a non-retriable error, or
    /// `max_attempts` is reached.
    ///
    /// The operation receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns the last error together with the number of attempts made.
    pub async fn run<T, E, F, Fut, R>(
        &self,
        is_retriable: R,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !is_retriable(&err) || attempt >= max_attempts {
                        return Err(RetryError {
                            attempts: attempt,
                            source: err,
                        });
                    }

                    let delay = self.delay_after(attempt);
                    #[allow(clippy::cast_possible_truncation)]
                    let delay_ms = delay.as_millis() as u64;
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms,
                        error = %err,
                        "transient error, retrying after delay"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
