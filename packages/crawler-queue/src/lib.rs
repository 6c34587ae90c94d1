//! Crawler Job Queue
//!
//! Priority job queue for web-crawl providers. Jobs are dispatched to a
//! pluggable [`ProviderService`], retried with backoff when a provider fails,
//! and optionally turned into training datasets and handed to a training
//! system.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crawler_queue::{
//!     CrawlerQueue, JobConfig, JobOptions, JobPriority, JobProcessor, JobScheduler,
//!     ProviderRegistry, QueueConfig,
//! };
//!
//! let queue = Arc::new(CrawlerQueue::new(QueueConfig::from_env()?));
//! let providers = Arc::new(ProviderRegistry::new().with_provider("jina", jina));
//! let processor = Arc::new(JobProcessor::new(queue.clone(), providers, notifier));
//! JobScheduler::new(processor).start()?;
//!
//! let id = queue.add_job(
//!     JobConfig::builder()
//!         .name("docs")
//!         .url("https://example.com")
//!         .provider("jina")
//!         .transform_for_training(true)
//!         .auto_train(true)
//!         .build(),
//!     JobOptions::with_priority(JobPriority::High),
//! )?;
//! ```
//!
//! # Modules
//!
//! - [`jobs`] - Queue, processor, scheduler, and retry policies
//! - [`providers`] - Provider contract and registry
//! - [`training`] - Training notifier contract and cross-queue aggregator
//! - [`config`] - Environment-driven configuration
//! - [`error`] - Typed errors
//! - [`testing`] - Mock implementations for testing

pub mod config;
pub mod error;
pub mod jobs;
pub mod providers;
pub mod testing;
pub mod training;

// Re-export core types at crate root
pub use config::{ProcessorConfig, QueueConfig, RetryConfig, RetryStrategy, SchedulerConfig};
pub use error::{ErrorKind, QueueError, Result};
pub use jobs::{
    CrawlerQueue, ExponentialBackoff, FixedDelay, JobConfig, JobEvent, JobHandle, JobOptions,
    JobPriority, JobProcessor, JobRecord, JobScheduler, JobStatus, QueueStats, RetryPolicy,
    TrainingConfig,
};
pub use providers::{
    ProviderJob, ProviderJobStatus, ProviderRegistry, ProviderService, TrainingDataset,
};
pub use training::{
    JobSource, ProgressEvent, ProgressEventType, SourceJob, SourceJobStatus, TrainingAggregator,
    TrainingProgressNotifier, TrainingRun, TrainingSource, TrainingSourceRef, TrainingStartData,
    CRAWLER_SOURCE,
};
