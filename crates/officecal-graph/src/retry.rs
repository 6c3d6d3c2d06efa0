//! Retry policy for transient failures.
//!
//! The policy is a plain value: which outcomes are retried (transient
//! [`GraphError`]s, and the status codes that classify as transient), how many
//! attempts are made in total, and how long to wait between them. A
//! remote-supplied `Retry-After` hint takes precedence over the computed
//! exponential backoff.

use std::future::Future;
use std::time::Duration;

use officecal_core::{GraphError, GraphResult};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Retry behaviour for one logical request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Wait after the first failed attempt.
    pub base_delay: Duration,
    /// Factor applied to the wait after each further failure.
    pub multiplier: f64,
    /// Upper bound for computed backoff (hints are not capped by this).
    pub max_delay: Duration,
    /// HTTP statuses classified as transient.
    pub retryable_statuses: Vec<u16>,
    /// Longest `Retry-After` hint that will be waited out; longer hints are
    /// clamped to this. A caller deadline still bounds the total wait.
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            retryable_statuses: vec![429, 503, 504],
            max_retry_after: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the total number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the backoff parameters.
    pub fn with_backoff(mut self, base: Duration, max: Duration, multiplier: f64) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self.multiplier = multiplier;
        self
    }

    /// Sets the statuses treated as transient.
    pub fn with_retryable_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.retryable_statuses = statuses;
        self
    }

    /// Sets the ceiling applied to `Retry-After` hints.
    pub fn with_max_retry_after(mut self, max: Duration) -> Self {
        self.max_retry_after = max;
        self
    }

    /// Validates the policy.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry max_attempts must be at least 1".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err("retry multiplier must be >= 1.0".to_string());
        }
        Ok(())
    }

    /// Computed backoff after `failed_attempts` failures (1-based).
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        if failed_attempts == 0 {
            return Duration::ZERO;
        }
        let exponent = (failed_attempts - 1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        Duration::from_secs_f64(secs.min(max))
    }

    /// Wait before the next attempt. A hint wins over the computed backoff,
    /// clamped to `max_retry_after`.
    pub fn delay_for(&self, failed_attempts: u32, hint: Option<Duration>) -> Duration {
        match hint {
            Some(hint) => hint.min(self.max_retry_after),
            None => self.backoff(failed_attempts),
        }
    }

    /// Runs `operation` under this policy.
    ///
    /// The closure receives the 1-based attempt number. Only errors whose
    /// classification is transient are retried. If `deadline` passes, the
    /// in-flight attempt is abandoned and the most recent error is returned.
    pub async fn run<T, F, Fut>(&self, deadline: Option<Instant>, mut operation: F) -> GraphResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = GraphResult<T>>,
    {
        let mut last_error: Option<GraphError> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, operation(attempt)).await {
                        Ok(outcome) => outcome,
                        Err(_) => return Err(deadline_elapsed(last_error)),
                    }
                }
                None => operation(attempt).await,
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt >= self.max_attempts {
                warn!(attempts = attempt, error = %err, "giving up after transient failures");
                return Err(err);
            }

            let delay = self.delay_for(attempt, err.retry_after());
            if let Some(hint) = err.retry_after()
                && hint > delay
            {
                debug!(
                    retry_after_secs = hint.as_secs(),
                    wait_secs = delay.as_secs(),
                    "retry hint clamped"
                );
            }

            if let Some(deadline) = deadline
                && Instant::now() + delay >= deadline
            {
                debug!("deadline leaves no room for another attempt");
                return Err(err);
            }

            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            last_error = Some(err);
            tokio::time::sleep(delay).await;
        }
    }
}

fn deadline_elapsed(last_error: Option<GraphError>) -> GraphError {
    last_error.unwrap_or_else(|| GraphError::transient("deadline elapsed before the request completed"))
}
