use crate::Error;
use std::time::Duration;

/// Outcome of [`RetryPolicy::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub retryable: bool,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry { delay: Duration },
    Fail,
}

/// Stateless retry policy with exponential backoff.
///
/// - `attempt` is 0-based (first failure => attempt=0), so the first retry
///   waits `base_delay`, the second `2 * base_delay`, and so on.
/// - The caller owns the attempt counter and the sleep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Connection failures, timeouts, 5xx and 429 are retryable; everything
    /// else (other 4xx, parse, configuration, cancellation) is terminal.
    pub fn classify(&self, err: &Error) -> Classification {
        let retryable = match err {
            Error::Connection { .. } | Error::Timeout { .. } => true,
            Error::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            Error::Parse { .. } | Error::Configuration { .. } | Error::Cancelled { .. } => false,
        };
        Classification { retryable }
    }

    /// `base_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }

    /// Decide what to do after attempt `attempt` failed with `err`.
    ///
    /// A server-provided `Retry-After` replaces the computed backoff; both are
    /// capped at `max_delay`.
    pub fn decide(&self, err: &Error, attempt: u32) -> Decision {
        if attempt >= self.max_retries || !self.classify(err).retryable {
            return Decision::Fail;
        }
        let delay = err
            .retry_after()
            .map(|d| d.min(self.max_delay))
            .unwrap_or_else(|| self.delay_for(attempt));
        Decision::Retry { delay }
    }
}
