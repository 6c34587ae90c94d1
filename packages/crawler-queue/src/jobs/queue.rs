//! In-memory crawler job queue.
//!
//! The queue owns every [`JobRecord`] and the selection policy: among
//! `queued`/`retrying` jobs whose backoff has elapsed, highest priority first,
//! FIFO within a priority. Claims are a per-job compare-and-swap into
//! `processing`, so concurrent workers never run the same job.
//!
//! The queue also owns the lifecycle primitives the scheduler runs under
//! (shutdown token, task tracker, wake-up notify), so [`CrawlerQueue::shutdown`]
//! can quiesce every worker it spawned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::futures::Notified;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};
use uuid::Uuid;

use super::events::JobEvent;
use super::job::{JobConfig, JobHandle, JobOptions, JobRecord, JobStatus};
use super::retry::RetryPolicy;
use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::training::{JobSource, SourceJob, SourceJobStatus};

/// Job counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub processing: usize,
    pub retrying: usize,
    pub training: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.queued + self.processing + self.retrying + self.training + self.completed + self.failed
    }

    fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Queued => self.queued += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Retrying => self.retrying += 1,
            JobStatus::Training => self.training += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }
}

pub struct CrawlerQueue {
    jobs: RwLock<HashMap<Uuid, JobHandle>>,
    sequence: AtomicU64,
    config: QueueConfig,
    retry_policy: Box<dyn RetryPolicy>,
    events: broadcast::Sender<JobEvent>,
    wake: Notify,
    shutting_down: AtomicBool,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl CrawlerQueue {
    /// Create a queue using the retry policy described by `config.retry`.
    pub fn new(config: QueueConfig) -> Self {
        let retry_policy = config.retry.policy();
        Self::with_retry_policy(config, retry_policy)
    }

    /// Create with a custom retry policy.
    pub fn with_retry_policy(config: QueueConfig, retry_policy: Box<dyn RetryPolicy>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            jobs: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            config,
            retry_policy,
            events,
            wake: Notify::new(),
            shutting_down: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &dyn RetryPolicy {
        self.retry_policy.as_ref()
    }

    /// Validate and enqueue a job, returning its ID.
    pub fn add_job(&self, config: JobConfig, options: JobOptions) -> Result<Uuid> {
        if self.is_shutting_down() {
            return Err(QueueError::ShutdownInProgress);
        }
        config.validate()?;

        let id = Uuid::now_v7();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let provider = config.provider.clone();
        let record = JobRecord::new(
            id,
            config,
            options,
            self.config.default_max_attempts,
            sequence,
        );

        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, JobHandle::new(record));

        info!(
            job_id = %id,
            provider = %provider,
            priority = %options.priority,
            "job enqueued"
        );
        self.publish(JobEvent::Enqueued {
            job_id: id,
            provider,
            priority: options.priority,
        });
        self.wake.notify_waiters();

        Ok(id)
    }

    /// Live handle to a job, if it exists.
    pub fn get_job(&self, job_id: Uuid) -> Option<JobHandle> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_id)
            .cloned()
    }

    /// Snapshots of every job, in selection order.
    pub fn jobs(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.handles().iter().map(JobHandle::snapshot).collect();
        jobs.sort_by_key(JobRecord::selection_key);
        jobs
    }

    /// Snapshots of jobs currently in `status`, in selection order.
    pub fn jobs_with_status(&self, status: JobStatus) -> Vec<JobRecord> {
        self.jobs()
            .into_iter()
            .filter(|job| job.status == status)
            .collect()
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for handle in self.handles() {
            stats.record(handle.status());
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every job. Handles already held by workers stay valid.
    pub fn clear(&self) {
        let removed = {
            let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
            let count = jobs.len();
            jobs.clear();
            count
        };
        info!(removed, "queue cleared");
    }

    /// Claim the next ready job, moving it to `processing`.
    ///
    /// Claims nothing once shutdown has begun.
    pub fn claim_next(&self, now: DateTime<Utc>) -> Option<JobHandle> {
        if self.is_shutting_down() {
            return None;
        }

        let mut candidates: Vec<(JobHandle, (u8, u64))> = self
            .handles()
            .into_iter()
            .filter_map(|handle| {
                let key = handle.read(|job| job.is_ready(now).then(|| job.selection_key()))?;
                Some((handle, key))
            })
            .collect();
        candidates.sort_by_key(|(_, key)| *key);

        // Another worker may win the CAS between the scan and the claim.
        for (handle, _) in candidates {
            if handle.try_claim(Some(now)).is_ok() {
                debug!(job_id = %handle.id(), "job claimed");
                return Some(handle);
            }
        }
        None
    }

    /// Claim one specific job regardless of its backoff window.
    pub fn claim(&self, job_id: Uuid) -> Result<JobHandle> {
        let handle = self.get_job(job_id).ok_or(QueueError::JobNotFound(job_id))?;
        handle
            .try_claim(None)
            .map_err(|status| QueueError::NotClaimable { job_id, status })?;
        debug!(job_id = %job_id, "job claimed directly");
        Ok(handle)
    }

    /// Time until the earliest retrying job becomes eligible.
    pub fn next_wake_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.handles()
            .iter()
            .filter_map(|handle| {
                handle.read(|job| match job.status {
                    JobStatus::Queued => Some(now),
                    JobStatus::Retrying => Some(job.next_eligible_at.unwrap_or(now)),
                    _ => None,
                })
            })
            .min()
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Stop the scheduler and wait for in-flight jobs to settle.
    ///
    /// New submissions are rejected immediately. Workers and direct
    /// `process_job`/`process_next` callers finish the job they hold
    /// (provider polling is cut short and recorded as an interrupted
    /// attempt) before this returns.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("shutdown already requested");
        } else {
            info!(in_flight = self.stats().processing, "queue shutting down");
        }

        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        info!("queue shut down");
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Resolves on the next `add_job` or retry scheduling.
    pub(crate) fn work_notified(&self) -> Notified<'_> {
        self.wake.notified()
    }

    pub(crate) fn notify_work(&self) {
        self.wake.notify_waiters();
    }

    pub(crate) fn publish(&self, event: JobEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn handles(&self) -> Vec<JobHandle> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

impl Default for CrawlerQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

/// Crawler jobs as seen by the training aggregator.
#[async_trait]
impl JobSource for CrawlerQueue {
    async fn source_job(&self, job_id: Uuid) -> anyhow::Result<Option<SourceJob>> {
        Ok(self.get_job(job_id).map(|handle| {
            handle.read(|job| SourceJob {
                status: SourceJobStatus::from(job.status),
                result_path: job.dataset_path.clone(),
            })
        }))
    }
}

impl From<JobStatus> for SourceJobStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued | JobStatus::Retrying => SourceJobStatus::Pending,
            JobStatus::Processing => SourceJobStatus::Processing,
            JobStatus::Completed => SourceJobStatus::Completed,
            JobStatus::Training => SourceJobStatus::Training,
            JobStatus::Failed => SourceJobStatus::Failed,
        }
    }
}
