use std::time::Duration;

use http::StatusCode;
use rand::Rng;

use crate::error::TransportError;

/// Exponent cap so delays stop growing after a handful of attempts.
const MAX_BACKOFF_EXPONENT: u32 = 6;

#[derive(Debug, Clone)]
pub struct RetryOn {
    pub retry_429: bool,
    pub retry_5xx: bool,
    pub retry_transport: bool,
}

impl RetryOn {
    pub fn matches_status(&self, status: StatusCode) -> bool {
        (self.retry_429 && status == StatusCode::TOO_MANY_REQUESTS)
            || (self.retry_5xx && status.is_server_error())
    }

    pub fn matches(&self, err: &TransportError) -> bool {
        match err {
            TransportError::Http { status, .. } => self.matches_status(*status),
            TransportError::Timeout | TransportError::Network(_) => self.retry_transport,
            TransportError::Build(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_attempts: u64,
    pub base_delay: Duration,
    pub retry_on: RetryOn,
}

impl RetryPolicy {
    /// Whether the retry budget still covers the 1-based `attempt`.
    pub fn allows(&self, attempt: u64) -> bool {
        attempt <= self.max_attempts
    }

    pub fn delay_for(&self, attempt: u64) -> Duration {
        backoff(self.base_delay, attempt)
    }
}

/// Exponential backoff with +/-10% jitter. `attempt` is 1-based; the
/// exponent is clamped to [0, 6].
pub fn backoff(base: Duration, attempt: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT as u64) as u32;
    let raw = base.saturating_mul(2_u32.pow(exponent));
    let jitter = rand::rng().random_range(0.9..1.1);
    raw.mul_f64(jitter)
}
