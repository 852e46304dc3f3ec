/*!
 * Retry with exponential backoff for provider calls.
 *
 * Only errors the caller classifies as transient are retried. Every other
 * error is returned on the attempt that produced it. `run_until` also gives
 * up, mid-call or mid-backoff, as soon as a stop future resolves.
 */

use std::future::Future;
use std::time::Duration;

use log::warn;
use rand::Rng;

use crate::app_config::TranslationCommonConfig;

/// Backoff settings for one kind of request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for a single delay, before jitter
    pub max_delay_ms: u64,
}

/// Result of a retried operation along with how many attempts it took
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&TranslationCommonConfig::default())
    }
}

impl From<&TranslationCommonConfig> for RetryPolicy {
    fn from(config: &TranslationCommonConfig) -> Self {
        Self {
            max_attempts: config.retry_count.saturating_add(1),
            base_delay_ms: config.retry_backoff_ms,
            max_delay_ms: config.retry_max_backoff_ms.max(config.retry_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), with up to 25% jitter
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        if delay == 0 {
            return Duration::ZERO;
        }
        let jitter = rand::rng().random_range(0..=delay / 4);
        Duration::from_millis(delay + jitter)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut, P>(&self, label: &str, operation: F, is_transient: P) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        self.run_until(label, operation, is_transient, std::future::pending()).await
    }

    /// Like [`RetryPolicy::run`], but abandons the pending call or backoff as
    /// soon as `stop` resolves, returning the error it yields.
    pub async fn run_until<T, E, F, Fut, P, S>(
        &self,
        label: &str,
        mut operation: F,
        is_transient: P,
        stop: S,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
        S: Future<Output = E>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        tokio::pin!(stop);
        loop {
            let result = tokio::select! {
                biased;
                error = &mut stop => Err(error),
                result = operation(attempt) => result,
            };
            let error = match result {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(error) => error,
            };
            if attempt >= max_attempts || !is_transient(&error) {
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                };
            }

            let delay = self.calculate_delay(attempt);
            warn!(
                "{}: attempt {}/{} failed ({}), retrying in {} ms",
                label,
                attempt,
                max_attempts,
                error,
                delay.as_millis()
            );
            tokio::select! {
                biased;
                error = &mut stop => {
                    return RetryOutcome {
                        result: Err(error),
                        attempts: attempt,
                    };
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
