//! Retry policy and per-envelope retry state.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tokio_retry::strategy::ExponentialBackoff;

/// Default number of attempts before an envelope is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Default upper bound for any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Exponential backoff with optional equal jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per envelope, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A fresh delay schedule, one item per failed attempt.
    ///
    /// The nominal delays are `base, 2*base, 4*base, ...` capped at `max_delay`.
    /// With jitter each delay is drawn uniformly from the upper half of its
    /// nominal value, so it never drops below the previous nominal delay.
    pub fn schedule(&self) -> Backoff {
        // ExponentialBackoff yields factor * 2^n for n >= 1, i.e. twice the
        // nominal delay; Backoff halves it back.
        let base_ms = self.base_delay.as_millis() as u64;
        let nominal = ExponentialBackoff::from_millis(2)
            .factor(base_ms)
            .max_delay(self.max_delay.saturating_mul(2));

        Backoff {
            nominal,
            jitter: self.jitter,
        }
    }

    /// Returns true if another attempt is allowed after `attempts` attempts.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Delay schedule produced by [`RetryPolicy::schedule`]. Never ends.
#[derive(Debug, Clone)]
pub struct Backoff {
    nominal: ExponentialBackoff,
    jitter: bool,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let nominal = self.nominal.next()? / 2;
        if !self.jitter || nominal.is_zero() {
            return Some(nominal);
        }

        let nominal_ms = nominal.as_millis() as u64;
        let jittered = rand::thread_rng().gen_range(nominal_ms / 2..=nominal_ms);
        Some(Duration::from_millis(jittered))
    }
}

/// Retry bookkeeping for the envelope a worker is currently processing.
///
/// Created when the envelope is picked up and dropped once it reaches a
/// terminal state.
#[derive(Debug)]
pub struct RetryState {
    attempts: u32,
    backoff: Backoff,
    next_retry_at: Option<Instant>,
    errors: Vec<String>,
}

impl RetryState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempts: 0,
            backoff: policy.schedule(),
            next_retry_at: None,
            errors: Vec::new(),
        }
    }

    /// Count the start of an attempt.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.next_retry_at = None;
        self.attempts
    }

    /// Record a failed attempt that will be retried and return the delay
    /// before the next one.
    pub fn schedule_retry(&mut self, error: impl Into<String>) -> Duration {
        self.errors.push(error.into());
        let delay = self.backoff.next().unwrap_or_default();
        self.next_retry_at = Some(Instant::now() + delay);
        delay
    }

    /// Record a failed attempt that will not be retried.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.next_retry_at = None;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn next_retry_at(&self) -> Option<Instant> {
        self.next_retry_at
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(String::as_str)
    }
}
