//! Training hand-off.
//!
//! The queue core never trains anything. It reports a training kick-off to a
//! [`TrainingProgressNotifier`] and reads sibling queues through the narrow
//! [`JobSource`] interface so crawler-derived and document-derived datasets
//! can feed one training run.

mod aggregator;

pub use aggregator::{TrainingAggregator, TrainingRun};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source type tag for jobs from the crawler queue.
pub const CRAWLER_SOURCE: &str = "crawler";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    Start,
    Progress,
    Error,
}

/// Training progress update.
///
/// The core only produces `Start`; `Progress` and `Error` come from the
/// training system itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: ProgressEventType,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl ProgressEvent {
    /// Training kick-off for `sources`.
    pub fn start(job_id: Uuid, data: &TrainingStartData) -> Self {
        Self {
            job_id,
            event_type: ProgressEventType::Start,
            timestamp: Utc::now(),
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Payload of a `start` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStartData {
    pub sources: Vec<TrainingSourceRef>,
    pub model_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_name: Option<String>,
}

/// One job feeding a training run.
///
/// `path` is the job's dataset location when it produced one; plain crawls
/// without a transform step have none and are passed by job ID alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSourceRef {
    #[serde(rename = "type")]
    pub source_type: String,
    pub job_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Sink for training progress updates.
#[async_trait]
pub trait TrainingProgressNotifier: Send + Sync {
    async fn update_progress(&self, event: ProgressEvent) -> Result<()>;
}

/// Reference to a job in some queue, as passed to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub job_id: Uuid,
}

impl TrainingSource {
    pub fn new(source_type: impl Into<String>, job_id: Uuid) -> Self {
        Self {
            source_type: source_type.into(),
            job_id,
        }
    }

    pub fn crawler(job_id: Uuid) -> Self {
        Self::new(CRAWLER_SOURCE, job_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceJobStatus {
    Pending,
    Processing,
    Completed,
    Training,
    Failed,
}

impl SourceJobStatus {
    /// Whether the job's output can feed a training run.
    pub fn is_ready(&self) -> bool {
        matches!(self, SourceJobStatus::Completed | SourceJobStatus::Training)
    }
}

/// Minimal view of a job in any queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceJob {
    pub status: SourceJobStatus,
    pub result_path: Option<String>,
}

/// Read-only query interface every queue exposes to the aggregator.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn source_job(&self, job_id: Uuid) -> Result<Option<SourceJob>>;
}
