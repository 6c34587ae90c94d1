//! Testing utilities including mock implementations.
//!
//! These let applications exercise the queue, processor, and aggregator
//! without a real crawling backend or training service.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::jobs::{JobConfig, TrainingConfig};
use crate::providers::{ProviderJob, ProviderJobStatus, ProviderService, TrainingDataset};
use crate::training::{
    JobSource, ProgressEvent, SourceJob, SourceJobStatus, TrainingProgressNotifier,
};

// ============================================================================
// MockProvider
// ============================================================================

/// A scriptable [`ProviderService`].
///
/// Clones share state, so a test can keep one copy for assertions and hand
/// another to the registry.
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<RwLock<MockProviderState>>,
}

#[derive(Default)]
struct MockProviderState {
    /// Number of upcoming `start_job` calls that fail
    start_failures: u32,
    /// Number of upcoming provider jobs that report `failed`
    crawl_failures: u32,
    /// Number of upcoming `transform_data_for_training` calls that fail
    transform_failures: u32,
    /// Pending polls before each provider job completes
    pending_polls: u32,
    /// Latency of every `get_job_status` call
    status_delay: Option<Duration>,
    results: Option<serde_json::Value>,
    polls: HashMap<String, u32>,
    failed_jobs: Vec<String>,
    next_id: u64,
    calls: Vec<MockProviderCall>,
}

/// Record of a call made to the mock provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockProviderCall {
    StartJob { name: String, url: String },
    GetJobStatus { provider_job_id: String },
    GetResults { provider_job_id: String },
    Transform {
        dataset_name: Option<String>,
        results: serde_json::Value,
    },
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` `start_job` calls.
    pub fn with_failed_starts(self, count: u32) -> Self {
        self.state_mut(|s| s.start_failures = count);
        self
    }

    /// Have the next `count` started crawls report `failed`.
    pub fn with_failed_crawls(self, count: u32) -> Self {
        self.state_mut(|s| s.crawl_failures = count);
        self
    }

    /// Fail the next `count` transform calls.
    pub fn with_failed_transforms(self, count: u32) -> Self {
        self.state_mut(|s| s.transform_failures = count);
        self
    }

    /// Report `pending` this many times per crawl before completing.
    pub fn with_pending_polls(self, count: u32) -> Self {
        self.state_mut(|s| s.pending_polls = count);
        self
    }

    /// Make every status poll take `delay` before answering.
    pub fn with_status_delay(self, delay: Duration) -> Self {
        self.state_mut(|s| s.status_delay = Some(delay));
        self
    }

    /// Results returned by `get_results`.
    pub fn with_results(self, results: serde_json::Value) -> Self {
        self.state_mut(|s| s.results = Some(results));
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockProviderCall> {
        self.state(|s| s.calls.clone())
    }

    /// Job names passed to `start_job`, in call order.
    pub fn started_jobs(&self) -> Vec<String> {
        self.state(|s| {
            s.calls
                .iter()
                .filter_map(|call| match call {
                    MockProviderCall::StartJob { name, .. } => Some(name.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    /// Results payloads passed to `transform_data_for_training`, in call order.
    pub fn transform_inputs(&self) -> Vec<serde_json::Value> {
        self.state(|s| {
            s.calls
                .iter()
                .filter_map(|call| match call {
                    MockProviderCall::Transform { results, .. } => Some(results.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn start_call_count(&self) -> usize {
        self.count(|call| matches!(call, MockProviderCall::StartJob { .. }))
    }

    pub fn status_call_count(&self) -> usize {
        self.count(|call| matches!(call, MockProviderCall::GetJobStatus { .. }))
    }

    pub fn results_call_count(&self) -> usize {
        self.count(|call| matches!(call, MockProviderCall::GetResults { .. }))
    }

    pub fn transform_call_count(&self) -> usize {
        self.count(|call| matches!(call, MockProviderCall::Transform { .. }))
    }

    fn count(&self, predicate: impl Fn(&MockProviderCall) -> bool) -> usize {
        self.state(|s| s.calls.iter().filter(|call| predicate(call)).count())
    }

    fn state<R>(&self, f: impl FnOnce(&MockProviderState) -> R) -> R {
        f(&self.state.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn state_mut<R>(&self, f: impl FnOnce(&mut MockProviderState) -> R) -> R {
        f(&mut self.state.write().unwrap_or_else(|e| e.into_inner()))
    }
}

#[async_trait]
impl ProviderService for MockProvider {
    async fn start_job(&self, config: &JobConfig) -> Result<ProviderJob> {
        self.state_mut(|s| {
            s.calls.push(MockProviderCall::StartJob {
                name: config.name.clone(),
                url: config.url.clone(),
            });
            if s.start_failures > 0 {
                s.start_failures -= 1;
                bail!("mock provider refused to start {}", config.url);
            }

            s.next_id += 1;
            let provider_job_id = format!("mock-{}", s.next_id);
            if s.crawl_failures > 0 {
                s.crawl_failures -= 1;
                s.failed_jobs.push(provider_job_id.clone());
            }
            Ok(ProviderJob::new(provider_job_id))
        })
    }

    async fn get_job_status(&self, provider_job_id: &str) -> Result<ProviderJobStatus> {
        let delay = self.state_mut(|s| {
            s.calls.push(MockProviderCall::GetJobStatus {
                provider_job_id: provider_job_id.to_string(),
            });
            s.status_delay
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.state_mut(|s| {
            if s.failed_jobs.iter().any(|id| id == provider_job_id) {
                return Ok(ProviderJobStatus::Failed {
                    message: Some("mock crawl failed".to_string()),
                });
            }

            let pending_polls = s.pending_polls;
            let polls = s.polls.entry(provider_job_id.to_string()).or_insert(0);
            *polls = polls.saturating_add(1);
            if *polls <= pending_polls {
                Ok(ProviderJobStatus::Pending)
            } else {
                Ok(ProviderJobStatus::Completed)
            }
        })
    }

    async fn get_results(&self, provider_job_id: &str) -> Result<serde_json::Value> {
        self.state_mut(|s| {
            s.calls.push(MockProviderCall::GetResults {
                provider_job_id: provider_job_id.to_string(),
            });
            Ok(s.results.clone().unwrap_or_else(|| {
                serde_json::json!({
                    "providerJobId": provider_job_id,
                    "pages": [{ "url": "https://example.com", "content": "mock page" }],
                })
            }))
        })
    }

    async fn transform_data_for_training(
        &self,
        results: &serde_json::Value,
        training: &TrainingConfig,
    ) -> Result<TrainingDataset> {
        self.state_mut(|s| {
            s.calls.push(MockProviderCall::Transform {
                dataset_name: training.dataset_name.clone(),
                results: results.clone(),
            });
            if s.transform_failures > 0 {
                s.transform_failures -= 1;
                bail!("mock transform failed");
            }
            let name = training.dataset_name.as_deref().unwrap_or("dataset");
            Ok(TrainingDataset::new(format!("datasets/{name}.jsonl")))
        })
    }
}

// ============================================================================
// RecordingNotifier
// ============================================================================

/// A [`TrainingProgressNotifier`] that records every event.
#[derive(Default)]
pub struct RecordingNotifier {
    events: RwLock<Vec<ProgressEvent>>,
    should_fail: RwLock<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject subsequent updates.
    pub fn set_should_fail(&self, should_fail: bool) {
        *self.should_fail.write().unwrap_or_else(|e| e.into_inner()) = should_fail;
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl TrainingProgressNotifier for RecordingNotifier {
    async fn update_progress(&self, event: ProgressEvent) -> Result<()> {
        if *self.should_fail.read().unwrap_or_else(|e| e.into_inner()) {
            bail!("training service unavailable");
        }
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
        Ok(())
    }
}

// ============================================================================
// StaticJobSource
// ============================================================================

/// A [`JobSource`] backed by a fixed table, standing in for a sibling queue.
#[derive(Default)]
pub struct StaticJobSource {
    jobs: RwLock<HashMap<Uuid, SourceJob>>,
}

impl StaticJobSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job_id: Uuid, status: SourceJobStatus, result_path: Option<&str>) {
        self.jobs.write().unwrap_or_else(|e| e.into_inner()).insert(
            job_id,
            SourceJob {
                status,
                result_path: result_path.map(str::to_string),
            },
        );
    }
}

#[async_trait]
impl JobSource for StaticJobSource {
    async fn source_job(&self, job_id: Uuid) -> Result<Option<SourceJob>> {
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JobConfig {
        JobConfig::builder()
            .name("docs")
            .url("https://example.com")
            .provider("mock")
            .build()
    }

    #[tokio::test]
    async fn mock_provider_scripts_failures_then_succeeds() {
        let provider = MockProvider::new().with_failed_starts(1).with_pending_polls(1);

        assert!(provider.start_job(&config()).await.is_err());
        let job = provider.start_job(&config()).await.unwrap();
        assert_eq!(
            provider.get_job_status(&job.provider_job_id).await.unwrap(),
            ProviderJobStatus::Pending
        );
        assert_eq!(
            provider.get_job_status(&job.provider_job_id).await.unwrap(),
            ProviderJobStatus::Completed
        );
        assert_eq!(provider.start_call_count(), 2);
        assert_eq!(provider.started_jobs(), vec!["docs", "docs"]);
    }

    #[tokio::test]
    async fn clones_share_call_history() {
        let provider = MockProvider::new();
        let shared = provider.clone();
        shared.start_job(&config()).await.unwrap();
        assert_eq!(provider.start_call_count(), 1);
    }
}
