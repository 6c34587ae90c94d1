use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use dotenvy::dotenv;

/// Backoff shape for failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    #[default]
    Exponential,
    Fixed,
}

impl FromStr for RetryStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exponential" => Ok(RetryStrategy::Exponential),
            "fixed" => Ok(RetryStrategy::Fixed),
            other => bail!("unknown retry strategy '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub strategy: RetryStrategy,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            base_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(3600), // 1 hour
        }
    }
}

/// How the processor drives a provider job.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Delay between provider status polls
    pub poll_interval: Duration,
    /// Give up on a provider job still pending after this long
    pub poll_timeout: Duration,
    /// Model type used when a job's training config does not name one
    pub default_model_type: Option<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            poll_timeout: Duration::from_secs(300), // 5 minutes
            default_model_type: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of workers pulling from the queue
    pub concurrency: usize,
    /// Longest a worker sleeps when no job is ready
    pub idle_poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            idle_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Crawler queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub default_max_attempts: u32,
    pub retry: RetryConfig,
    pub processor: ProcessorConfig,
    pub scheduler: SchedulerConfig,
    /// Capacity of the job event broadcast channel
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            retry: RetryConfig::default(),
            processor: ProcessorConfig::default(),
            scheduler: SchedulerConfig::default(),
            event_capacity: 256,
        }
    }
}

impl QueueConfig {
    /// Load configuration from `CRAWLER_QUEUE_*` environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, defaulting unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            default_max_attempts: parse_or(
                &lookup,
                "CRAWLER_QUEUE_MAX_ATTEMPTS",
                defaults.default_max_attempts,
            )?,
            retry: RetryConfig {
                strategy: parse_or(
                    &lookup,
                    "CRAWLER_QUEUE_RETRY_STRATEGY",
                    defaults.retry.strategy,
                )?,
                base_delay: millis_or(
                    &lookup,
                    "CRAWLER_QUEUE_RETRY_BASE_DELAY_MS",
                    defaults.retry.base_delay,
                )?,
                multiplier: parse_or(
                    &lookup,
                    "CRAWLER_QUEUE_RETRY_MULTIPLIER",
                    defaults.retry.multiplier,
                )?,
                max_delay: millis_or(
                    &lookup,
                    "CRAWLER_QUEUE_RETRY_MAX_DELAY_MS",
                    defaults.retry.max_delay,
                )?,
            },
            processor: ProcessorConfig {
                poll_interval: millis_or(
                    &lookup,
                    "CRAWLER_QUEUE_POLL_INTERVAL_MS",
                    defaults.processor.poll_interval,
                )?,
                poll_timeout: millis_or(
                    &lookup,
                    "CRAWLER_QUEUE_POLL_TIMEOUT_MS",
                    defaults.processor.poll_timeout,
                )?,
                default_model_type: lookup("CRAWLER_QUEUE_DEFAULT_MODEL_TYPE")
                    .filter(|v| !v.trim().is_empty()),
            },
            scheduler: SchedulerConfig {
                concurrency: parse_or(
                    &lookup,
                    "CRAWLER_QUEUE_CONCURRENCY",
                    defaults.scheduler.concurrency,
                )?,
                idle_poll_interval: millis_or(
                    &lookup,
                    "CRAWLER_QUEUE_IDLE_POLL_INTERVAL_MS",
                    defaults.scheduler.idle_poll_interval,
                )?,
            },
            event_capacity: parse_or(
                &lookup,
                "CRAWLER_QUEUE_EVENT_CAPACITY",
                defaults.event_capacity,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_max_attempts == 0 {
            bail!("default_max_attempts must be at least 1");
        }
        if self.scheduler.concurrency == 0 {
            bail!("scheduler concurrency must be at least 1");
        }
        if self.processor.poll_interval.is_zero() {
            bail!("poll_interval must be non-zero");
        }
        if self.event_capacity == 0 {
            bail!("event_capacity must be at least 1");
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("{} must be valid, got '{}'", key, raw)),
        None => Ok(default),
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(lookup, key, default_ms).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = QueueConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.default_max_attempts, 3);
        assert_eq!(config.retry.strategy, RetryStrategy::Exponential);
        assert_eq!(config.processor.poll_timeout, Duration::from_secs(300));
        assert_eq!(config.scheduler.concurrency, 1);
    }

    #[test]
    fn reads_overrides() {
        let config = QueueConfig::from_lookup(lookup_from(&[
            ("CRAWLER_QUEUE_MAX_ATTEMPTS", "5"),
            ("CRAWLER_QUEUE_RETRY_STRATEGY", "Fixed"),
            ("CRAWLER_QUEUE_RETRY_BASE_DELAY_MS", "250"),
            ("CRAWLER_QUEUE_POLL_INTERVAL_MS", "50"),
            ("CRAWLER_QUEUE_CONCURRENCY", "4"),
            ("CRAWLER_QUEUE_DEFAULT_MODEL_TYPE", "llama"),
        ]))
        .unwrap();

        assert_eq!(config.default_max_attempts, 5);
        assert_eq!(config.retry.strategy, RetryStrategy::Fixed);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.processor.poll_interval, Duration::from_millis(50));
        assert_eq!(config.scheduler.concurrency, 4);
        assert_eq!(config.processor.default_model_type.as_deref(), Some("llama"));
    }

    #[test]
    fn malformed_value_names_the_key() {
        let err = QueueConfig::from_lookup(lookup_from(&[("CRAWLER_QUEUE_CONCURRENCY", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("CRAWLER_QUEUE_CONCURRENCY"));
    }

    #[test]
    fn zero_attempts_rejected() {
        assert!(
            QueueConfig::from_lookup(lookup_from(&[("CRAWLER_QUEUE_MAX_ATTEMPTS", "0")])).is_err()
        );
    }
}
