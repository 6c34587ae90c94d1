//! Retry decisions and backoff scheduling.
//!
//! Policies only read the job's own counters; they hold no queue state.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::job::JobRecord;
use crate::config::{RetryConfig, RetryStrategy};

/// Decides whether a failed attempt is retried and when it becomes eligible.
pub trait RetryPolicy: Send + Sync {
    /// Whether another attempt is allowed.
    fn should_retry(&self, job: &JobRecord) -> bool {
        job.attempts < job.max_attempts
    }

    /// Delay before the next attempt, given the attempts made so far.
    fn backoff(&self, attempts: u32) -> Duration;

    /// When a retrying job becomes selectable again.
    fn next_eligible_at(&self, job: &JobRecord, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.backoff(job.attempts))
            .unwrap_or_else(|_| chrono::Duration::MAX);
        now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// `base * multiplier^(attempts - 1)`, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub multiplier: u32,
    pub max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            multiplier: 2,
            max: Duration::from_secs(3600), // 1 hour
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1);
        let factor = self.multiplier.max(1).checked_pow(exponent).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Same delay after every failure.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    pub delay: Duration,
}

impl RetryPolicy for FixedDelay {
    fn backoff(&self, _attempts: u32) -> Duration {
        self.delay
    }
}

impl RetryConfig {
    /// Build the policy this config describes.
    pub fn policy(&self) -> Box<dyn RetryPolicy> {
        match self.strategy {
            RetryStrategy::Exponential => Box::new(ExponentialBackoff {
                base: self.base_delay,
                multiplier: self.multiplier,
                max: self.max_delay,
            }),
            RetryStrategy::Fixed => Box::new(FixedDelay {
                delay: self.base_delay,
            }),
        }
    }
}
