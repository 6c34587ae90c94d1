//! Crawl provider contract.
//!
//! Each crawling backend ("jina", "firecrawl", ...) implements
//! [`ProviderService`]. The queue core only drives the lifecycle:
//!
//! ```text
//! start_job ─► get_job_status (poll) ─► get_results ─► transform_data_for_training
//! ```
//!
//! Credentials are the provider's business; the core never reads secrets.

mod registry;

pub use registry::ProviderRegistry;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::jobs::{JobConfig, TrainingConfig};

/// Handle returned by a provider when it accepts a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderJob {
    pub provider_job_id: String,
}

impl ProviderJob {
    pub fn new(provider_job_id: impl Into<String>) -> Self {
        Self {
            provider_job_id: provider_job_id.into(),
        }
    }
}

/// Provider-side status of a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProviderJobStatus {
    Pending,
    Completed,
    Failed { message: Option<String> },
}

/// Location of a training-ready dataset produced from crawl results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingDataset {
    pub path: String,
}

impl TrainingDataset {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// A crawling backend.
///
/// Errors are transport/auth/provider failures; the processor records them
/// on the job and lets the retry policy decide what happens next.
#[async_trait]
pub trait ProviderService: Send + Sync {
    /// Start a crawl for `config`.
    async fn start_job(&self, config: &JobConfig) -> Result<ProviderJob>;

    /// Current status of a started crawl.
    async fn get_job_status(&self, provider_job_id: &str) -> Result<ProviderJobStatus>;

    /// Raw results of a completed crawl.
    async fn get_results(&self, provider_job_id: &str) -> Result<serde_json::Value>;

    /// Convert raw crawl output into a training-ready dataset.
    async fn transform_data_for_training(
        &self,
        results: &serde_json::Value,
        training: &TrainingConfig,
    ) -> Result<TrainingDataset>;
}
