//! Job model for crawl jobs.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::error::{ErrorKind, QueueError, Result};

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    High,
    #[default]
    Normal,
    Low,
}

impl JobPriority {
    /// Ordering rank (lower = dequeued first)
    pub fn rank(&self) -> u8 {
        match self {
            JobPriority::High => 0,
            JobPriority::Normal => 1,
            JobPriority::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::High => "high",
            JobPriority::Normal => "normal",
            JobPriority::Low => "low",
        }
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobPriority {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(JobPriority::High),
            "normal" => Ok(JobPriority::Normal),
            "low" => Ok(JobPriority::Low),
            other => Err(QueueError::invalid_config(format!(
                "unknown priority '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Retrying,
    /// Dataset handed off to the training system
    Training,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Retrying,
        JobStatus::Training,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Retrying => "retrying",
            JobStatus::Training => "training",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// No processing transition leaves these states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Training | JobStatus::Failed
        )
    }

    /// States the scheduler may pick a job up from.
    pub fn is_claimable(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Retrying)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Retrying, Processing)
                | (Processing, Completed)
                | (Processing, Training)
                | (Processing, Retrying)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Job config
// ============================================================================

/// Dataset naming and model selection for the training hand-off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingConfig {
    pub dataset_name: Option<String>,
    pub model_type: Option<String>,
}

/// Immutable job submission.
///
/// Provider-specific fields (depth, selectors, max URLs, ...) are carried in
/// `options` and passed through to the provider untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub name: String,
    pub url: String,
    pub provider: String,
    #[builder(default)]
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
    #[builder(default)]
    #[serde(default)]
    pub transform_for_training: bool,
    #[builder(default)]
    #[serde(default)]
    pub auto_train: bool,
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub training_config: Option<TrainingConfig>,
}

impl JobConfig {
    /// Reject submissions that can never run.
    pub fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            return Err(QueueError::invalid_config("provider must not be empty"));
        }
        if self.url.trim().is_empty() {
            return Err(QueueError::invalid_config("url must not be empty"));
        }
        Ok(())
    }

    /// Look up a provider-specific option.
    pub fn option(&self, key: &str) -> Option<&serde_json::Value> {
        self.options.get(key)
    }

    /// Training config to hand the provider's transform step, falling back
    /// to the job name as the dataset name.
    pub fn effective_training_config(&self) -> TrainingConfig {
        let mut training = self.training_config.clone().unwrap_or_default();
        if training.dataset_name.is_none() {
            training.dataset_name = Some(self.name.clone());
        }
        training
    }
}

/// Per-submission options for [`CrawlerQueue::add_job`](super::CrawlerQueue::add_job).
#[derive(Debug, Clone, Copy, Default)]
pub struct JobOptions {
    pub priority: JobPriority,
    /// Overrides the queue's default attempt ceiling
    pub max_attempts: Option<u32>,
}

impl JobOptions {
    pub fn with_priority(priority: JobPriority) -> Self {
        Self {
            priority,
            ..Default::default()
        }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

// ============================================================================
// Job record
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub config: JobConfig,
    pub priority: JobPriority,
    pub status: JobStatus,

    // Attempt accounting
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_eligible_at: Option<DateTime<Utc>>,

    // Error tracking
    pub last_error: Option<String>,
    pub last_error_kind: Option<ErrorKind>,

    // Provider state
    pub provider_job_id: Option<String>,
    pub results: Option<serde_json::Value>,
    pub dataset_path: Option<String>,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Enqueue order; follows `created_at` without clock ties
    pub sequence: u64,
}

impl JobRecord {
    pub(crate) fn new(
        id: Uuid,
        config: JobConfig,
        options: JobOptions,
        default_max_attempts: u32,
        sequence: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            config,
            priority: options.priority,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts: options.max_attempts.unwrap_or(default_max_attempts).max(1),
            next_eligible_at: None,
            last_error: None,
            last_error_kind: None,
            provider_job_id: None,
            results: None,
            dataset_path: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            sequence,
        }
    }

    /// Whether the scheduler may pick this job up at `now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        if !self.status.is_claimable() {
            return false;
        }

        match self.next_eligible_at {
            None => true,
            Some(eligible_at) => eligible_at <= now,
        }
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// Selection order: priority, then FIFO.
    pub fn selection_key(&self) -> (u8, u64) {
        (self.priority.rank(), self.sequence)
    }

    pub(crate) fn transition(&mut self, to: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(QueueError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

// ============================================================================
// Live handle
// ============================================================================

/// Shared, live view of a job owned by the queue.
///
/// Reads reflect mutations made by the processor; use
/// [`JobHandle::snapshot`] for a stable copy.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: Uuid,
    record: Arc<RwLock<JobRecord>>,
}

impl JobHandle {
    pub(crate) fn new(record: JobRecord) -> Self {
        Self {
            id: record.id,
            record: Arc::new(RwLock::new(record)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn snapshot(&self) -> JobRecord {
        self.read(|job| job.clone())
    }

    pub fn status(&self) -> JobStatus {
        self.read(|job| job.status)
    }

    pub fn attempts(&self) -> u32 {
        self.read(|job| job.attempts)
    }

    pub fn last_error(&self) -> Option<String> {
        self.read(|job| job.last_error.clone())
    }

    pub fn provider_job_id(&self) -> Option<String> {
        self.read(|job| job.provider_job_id.clone())
    }

    pub fn results(&self) -> Option<serde_json::Value> {
        self.read(|job| job.results.clone())
    }

    pub fn dataset_path(&self) -> Option<String> {
        self.read(|job| job.dataset_path.clone())
    }

    pub fn read<R>(&self, f: impl FnOnce(&JobRecord) -> R) -> R {
        let guard = self.record.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut JobRecord) -> R) -> R {
        let mut guard = self.record.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Atomically move a claimable job into `processing`.
    ///
    /// With `now` set, a retrying job is only claimed once its backoff has
    /// elapsed. Returns the status that blocked the claim on failure.
    pub(crate) fn try_claim(&self, now: Option<DateTime<Utc>>) -> std::result::Result<(), JobStatus> {
        self.write(|job| {
            let eligible = match now {
                Some(now) => job.is_ready(now),
                None => job.status.is_claimable(),
            };
            if !eligible {
                return Err(job.status);
            }
            job.transition(JobStatus::Processing)
                .map_err(|_| job.status)?;
            job.next_eligible_at = None;
            Ok(())
        })
    }
}
