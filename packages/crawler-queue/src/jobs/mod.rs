//! Crawler job queue.
//!
//! This module provides the queue core:
//! - [`CrawlerQueue`] - In-memory job store with priority selection and claims
//! - [`JobProcessor`] - Runs one job through its provider and settles it
//! - [`JobScheduler`] - Worker pool that drains the queue in the background
//! - [`RetryPolicy`] - Decides whether and when a failed job runs again
//!
//! # Architecture
//!
//! ```text
//! caller ─► CrawlerQueue.add_job(config, options)
//!               └─► record queued, wake workers
//!
//! JobScheduler worker
//!     │
//!     ├─► CrawlerQueue.claim_next (queued/retrying ─► processing)
//!     ├─► JobProcessor.run_claimed
//!     │       ├─► ProviderService (start, poll, results, transform)
//!     │       └─► TrainingProgressNotifier (autoTrain)
//!     └─► completed | training | retrying (backoff) | failed
//! ```
//!
//! Providers and notifiers stay behind traits; this module never names a
//! concrete crawling backend.

pub mod events;
mod job;
mod processor;
mod queue;
mod retry;
mod worker;

pub use events::JobEvent;
pub use job::{
    JobConfig, JobHandle, JobOptions, JobPriority, JobRecord, JobStatus, TrainingConfig,
};
pub use processor::JobProcessor;
pub use queue::{CrawlerQueue, QueueStats};
pub use retry::{ExponentialBackoff, FixedDelay, RetryPolicy};
pub use worker::JobScheduler;
