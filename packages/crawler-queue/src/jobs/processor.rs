//! Job processor.
//!
//! Drives one claimed job through its provider and settles it:
//!
//! ```text
//! claimed (processing)
//!     │
//!     ├─► attempts += 1 (ceiling checked first)
//!     ├─► resolve provider (ProviderRegistry)
//!     ├─► start_job ─► poll get_job_status ─► get_results   (skipped when results exist)
//!     ├─► transform_data_for_training                       (transformForTraining)
//!     ├─► TrainingProgressNotifier "start"                  (autoTrain)
//!     └─► completed | training | retrying | failed
//! ```
//!
//! Provider failures never escape to callers; they are recorded on the job
//! (`last_error`) and fed to the queue's retry policy.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::JobEvent;
use super::job::{JobConfig, JobHandle, JobStatus};
use super::queue::CrawlerQueue;
use crate::config::ProcessorConfig;
use crate::error::{QueueError, Result};
use crate::providers::{ProviderJobStatus, ProviderRegistry, ProviderService};
use crate::training::{
    ProgressEvent, TrainingProgressNotifier, TrainingSourceRef, TrainingStartData, CRAWLER_SOURCE,
};

pub struct JobProcessor {
    queue: Arc<CrawlerQueue>,
    providers: Arc<ProviderRegistry>,
    notifier: Arc<dyn TrainingProgressNotifier>,
    config: ProcessorConfig,
}

impl JobProcessor {
    /// Create a processor using the queue's processor config.
    pub fn new(
        queue: Arc<CrawlerQueue>,
        providers: Arc<ProviderRegistry>,
        notifier: Arc<dyn TrainingProgressNotifier>,
    ) -> Self {
        let config = queue.config().processor.clone();
        Self::with_config(queue, providers, notifier, config)
    }

    /// Create with custom configuration.
    pub fn with_config(
        queue: Arc<CrawlerQueue>,
        providers: Arc<ProviderRegistry>,
        notifier: Arc<dyn TrainingProgressNotifier>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            queue,
            providers,
            notifier,
            config,
        }
    }

    pub fn queue(&self) -> &Arc<CrawlerQueue> {
        &self.queue
    }

    /// Process one specific job now, ignoring any backoff window.
    ///
    /// Returns the status the job settled in. Provider failures are not
    /// errors here; they show up as `retrying`/`failed` on the job.
    pub async fn process_job(&self, job_id: Uuid) -> Result<JobStatus> {
        // Held until the job settles so shutdown waits for it.
        let _in_flight = self.queue.tracker().token();
        if self.queue.is_shutting_down() {
            return Err(QueueError::ShutdownInProgress);
        }
        let handle = self.queue.claim(job_id)?;
        Ok(self.run_claimed(handle).await)
    }

    /// Claim and process the next ready job, if any.
    pub async fn process_next(&self) -> Result<Option<(Uuid, JobStatus)>> {
        let _in_flight = self.queue.tracker().token();
        if self.queue.is_shutting_down() {
            return Err(QueueError::ShutdownInProgress);
        }
        match self.queue.claim_next(Utc::now()) {
            Some(handle) => {
                let job_id = handle.id();
                Ok(Some((job_id, self.run_claimed(handle).await)))
            }
            None => Ok(None),
        }
    }

    /// Run a job this caller has already moved into `processing`.
    pub(crate) async fn run_claimed(&self, handle: JobHandle) -> JobStatus {
        let job_id = handle.id();
        let started = Instant::now();

        let begun = handle.write(|job| {
            if job.attempts >= job.max_attempts {
                return None;
            }
            job.attempts += 1;
            job.started_at.get_or_insert_with(Utc::now);
            Some((job.attempts, job.config.clone()))
        });

        let Some((attempt, config)) = begun else {
            let (attempts, max_attempts) = handle.read(|job| (job.attempts, job.max_attempts));
            let err = QueueError::AttemptsExhausted {
                job_id,
                attempts,
                max_attempts,
            };
            error!(job_id = %job_id, attempts, "claimed job has no attempts left");
            return self.settle_failure(&handle, err, attempts, false);
        };

        info!(
            job_id = %job_id,
            provider = %config.provider,
            attempt,
            "processing job"
        );
        self.queue.publish(JobEvent::Started {
            job_id,
            provider: config.provider.clone(),
            attempt,
        });

        match self.execute(&handle, &config).await {
            Ok(status) => self.settle_success(&handle, status, attempt, started),
            Err(e) => self.settle_failure(&handle, e, attempt, true),
        }
    }

    async fn execute(&self, handle: &JobHandle, config: &JobConfig) -> Result<JobStatus> {
        let service = self.providers.get_service_for_config(config)?;

        let results = match handle.results() {
            Some(results) => {
                debug!(job_id = %handle.id(), "reusing fetched results");
                results
            }
            None => {
                let results = self.crawl(handle, config, service.as_ref()).await?;
                handle.write(|job| job.results = Some(results.clone()));
                results
            }
        };

        if !config.transform_for_training {
            return Ok(JobStatus::Completed);
        }

        let training = config.effective_training_config();
        let dataset = service
            .transform_data_for_training(&results, &training)
            .await
            .map_err(|e| QueueError::provider(&config.provider, e))?;
        handle.write(|job| job.dataset_path = Some(dataset.path.clone()));
        debug!(job_id = %handle.id(), path = %dataset.path, "training dataset ready");

        if !config.auto_train {
            return Ok(JobStatus::Completed);
        }

        let data = TrainingStartData {
            sources: vec![TrainingSourceRef {
                source_type: CRAWLER_SOURCE.to_string(),
                job_id: handle.id(),
                path: Some(dataset.path),
            }],
            model_type: training
                .model_type
                .or_else(|| self.config.default_model_type.clone()),
            dataset_name: training.dataset_name,
        };
        self.notifier
            .update_progress(ProgressEvent::start(handle.id(), &data))
            .await
            .map_err(|e| QueueError::Notifier(format!("{e:#}")))?;

        Ok(JobStatus::Training)
    }

    /// Start the provider crawl, wait for it, and fetch its results.
    async fn crawl(
        &self,
        handle: &JobHandle,
        config: &JobConfig,
        service: &dyn ProviderService,
    ) -> Result<serde_json::Value> {
        let provider_job = service
            .start_job(config)
            .await
            .map_err(|e| QueueError::provider(&config.provider, e))?;
        let provider_job_id = provider_job.provider_job_id;
        handle.write(|job| job.provider_job_id = Some(provider_job_id.clone()));
        debug!(
            job_id = %handle.id(),
            provider_job_id = %provider_job_id,
            "provider job started"
        );

        self.wait_for_completion(config, service, &provider_job_id)
            .await?;

        service
            .get_results(&provider_job_id)
            .await
            .map_err(|e| QueueError::provider(&config.provider, e))
    }

    /// Poll the provider until its job finishes.
    ///
    /// The sleep between polls races the queue's shutdown token; provider
    /// calls themselves are never cut off.
    async fn wait_for_completion(
        &self,
        config: &JobConfig,
        service: &dyn ProviderService,
        provider_job_id: &str,
    ) -> Result<()> {
        let shutdown = self.queue.shutdown_token();
        let deadline = tokio::time::Instant::now() + self.config.poll_timeout;

        loop {
            let status = service
                .get_job_status(provider_job_id)
                .await
                .map_err(|e| QueueError::provider(&config.provider, e))?;

            match status {
                ProviderJobStatus::Completed => return Ok(()),
                ProviderJobStatus::Failed { message } => {
                    return Err(QueueError::ProviderJobFailed {
                        provider: config.provider.clone(),
                        provider_job_id: provider_job_id.to_string(),
                        message: message.unwrap_or_else(|| "no reason given".to_string()),
                    });
                }
                ProviderJobStatus::Pending => {}
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(QueueError::PollTimeout {
                    provider: config.provider.clone(),
                    provider_job_id: provider_job_id.to_string(),
                    waited_ms: u64::try_from(self.config.poll_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                });
            }

            let nap = self.config.poll_interval.min(deadline - now);
            tokio::select! {
                _ = shutdown.cancelled() => {
                    return Err(QueueError::Interrupted {
                        provider_job_id: provider_job_id.to_string(),
                    });
                }
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }

    fn settle_success(
        &self,
        handle: &JobHandle,
        status: JobStatus,
        attempt: u32,
        started: Instant,
    ) -> JobStatus {
        let job_id = handle.id();
        let settled = handle.write(|job| {
            if let Err(e) = job.transition(status) {
                error!(job_id = %job_id, error = %e, "failed to settle job");
                return job.status;
            }
            job.last_error = None;
            job.last_error_kind = None;
            job.finished_at = Some(Utc::now());
            job.status
        });

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(job_id = %job_id, status = %settled, attempt, duration_ms, "job succeeded");
        self.queue.publish(JobEvent::Succeeded {
            job_id,
            status: settled,
            attempt,
            duration_ms,
        });

        settled
    }

    /// Record a failed attempt and apply the retry policy.
    fn settle_failure(
        &self,
        handle: &JobHandle,
        err: QueueError,
        attempt: u32,
        retry_allowed: bool,
    ) -> JobStatus {
        let job_id = handle.id();
        let kind = err.kind();
        let message = err.to_string();
        let policy = self.queue.retry_policy();

        let (settled, next_eligible_at) = handle.write(|job| {
            job.last_error = Some(message.clone());
            job.last_error_kind = Some(kind);

            let now = Utc::now();
            let will_retry = retry_allowed && kind.should_retry() && policy.should_retry(job);
            let next = if will_retry {
                JobStatus::Retrying
            } else {
                JobStatus::Failed
            };

            if let Err(e) = job.transition(next) {
                error!(job_id = %job_id, error = %e, "failed to settle job");
                return (job.status, None);
            }
            if will_retry {
                job.next_eligible_at = Some(policy.next_eligible_at(job, now));
            } else {
                job.finished_at = Some(now);
            }
            (job.status, job.next_eligible_at)
        });

        let will_retry = settled == JobStatus::Retrying;
        warn!(
            job_id = %job_id,
            attempt,
            error = %message,
            error_kind = ?kind,
            will_retry,
            next_eligible_at = ?next_eligible_at,
            "job attempt failed"
        );
        self.queue.publish(JobEvent::Failed {
            job_id,
            error: message.clone(),
            error_kind: kind,
            attempt,
            will_retry,
        });

        if will_retry {
            self.queue.notify_work();
        } else if settled == JobStatus::Failed {
            error!(job_id = %job_id, total_attempts = attempt, "job failed permanently");
            self.queue.publish(JobEvent::Exhausted {
                job_id,
                total_attempts: attempt,
                final_error: message,
            });
        }

        settled
    }
}
