//! Background scheduler for the crawler queue.
//!
//! `JobScheduler` spawns a fixed pool of workers onto the queue's task
//! tracker. Each worker loops:
//!
//! ```text
//! worker
//!     │
//!     ├─► claim_next (priority, then FIFO; backoff respected)
//!     ├─► JobProcessor::run_claimed
//!     └─► idle: wait for add_job / retry wake-up, next backoff expiry,
//!         or the idle poll interval, whichever comes first
//! ```
//!
//! Workers stop when [`CrawlerQueue::shutdown`] cancels the queue's token;
//! the shutdown call waits for them.
//!
//! # Example
//!
//! ```ignore
//! let queue = Arc::new(CrawlerQueue::new(QueueConfig::from_env()?));
//! let processor = Arc::new(JobProcessor::new(queue.clone(), providers, notifier));
//! JobScheduler::new(processor).start()?;
//!
//! queue.add_job(config, JobOptions::with_priority(JobPriority::High))?;
//! // ...
//! queue.shutdown().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::processor::JobProcessor;
use super::queue::CrawlerQueue;
use crate::config::SchedulerConfig;
use crate::error::{QueueError, Result};

pub struct JobScheduler {
    processor: Arc<JobProcessor>,
    config: SchedulerConfig,
}

impl JobScheduler {
    /// Create a scheduler using the queue's scheduler config.
    pub fn new(processor: Arc<JobProcessor>) -> Self {
        let config = processor.queue().config().scheduler.clone();
        Self { processor, config }
    }

    /// Create with custom configuration.
    pub fn with_config(processor: Arc<JobProcessor>, config: SchedulerConfig) -> Self {
        Self { processor, config }
    }

    /// Spawn the worker pool. Returns immediately.
    pub fn start(self) -> Result<()> {
        let queue = self.processor.queue().clone();
        if queue.is_shutting_down() {
            return Err(QueueError::ShutdownInProgress);
        }
        if self.config.concurrency == 0 {
            return Err(QueueError::invalid_config(
                "scheduler concurrency must be at least 1",
            ));
        }

        info!(concurrency = self.config.concurrency, "starting crawler workers");
        for index in 0..self.config.concurrency {
            let worker = Worker {
                worker_id: format!("crawler-worker-{index}"),
                processor: self.processor.clone(),
                idle_poll_interval: self.config.idle_poll_interval,
            };
            queue.tracker().spawn(worker.run(queue.shutdown_token()));
        }
        Ok(())
    }
}

struct Worker {
    worker_id: String,
    processor: Arc<JobProcessor>,
    idle_poll_interval: Duration,
}

impl Worker {
    async fn run(self, shutdown: CancellationToken) {
        let queue: Arc<CrawlerQueue> = self.processor.queue().clone();
        info!(worker_id = %self.worker_id, "crawler worker starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            // Register for wake-ups before scanning so an add_job between the
            // scan and the sleep is not missed.
            let notified = queue.work_notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            // Returns nothing once shutdown has begun, even if the token
            // was cancelled after the check above.
            if let Some(handle) = queue.claim_next(Utc::now()) {
                let job_id = handle.id();
                let status = self.processor.run_claimed(handle).await;
                debug!(worker_id = %self.worker_id, job_id = %job_id, status = %status, "job settled");
                continue;
            }

            let wait = queue
                .next_wake_delay(Utc::now())
                .map_or(self.idle_poll_interval, |delay| {
                    delay.min(self.idle_poll_interval)
                });

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = &mut notified => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!(worker_id = %self.worker_id, "crawler worker stopped");
    }
}
