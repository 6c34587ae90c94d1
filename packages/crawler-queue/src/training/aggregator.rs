//! Cross-queue training aggregator.
//!
//! Combines finished jobs from several queues (crawler, document ingestion,
//! ...) into a single training `start` event. Each queue is reached only
//! through its [`JobSource`] registration, never through its storage.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    JobSource, ProgressEvent, TrainingProgressNotifier, TrainingSource, TrainingSourceRef,
    TrainingStartData,
};
use crate::error::{QueueError, Result};

/// A training run accepted by the notifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRun {
    pub training_id: Uuid,
    pub data: TrainingStartData,
}

pub struct TrainingAggregator {
    sources: HashMap<String, Arc<dyn JobSource>>,
    notifier: Arc<dyn TrainingProgressNotifier>,
}

impl TrainingAggregator {
    pub fn new(notifier: Arc<dyn TrainingProgressNotifier>) -> Self {
        Self {
            sources: HashMap::new(),
            notifier,
        }
    }

    /// Register the queue that owns jobs of `source_type`.
    pub fn register_source(&mut self, source_type: impl Into<String>, source: Arc<dyn JobSource>) {
        self.sources.insert(source_type.into(), source);
    }

    /// Builder-style [`register_source`](Self::register_source).
    pub fn with_source(mut self, source_type: impl Into<String>, source: Arc<dyn JobSource>) -> Self {
        self.register_source(source_type, source);
        self
    }

    pub fn source_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Start one training run over every referenced source.
    ///
    /// Every source must be `completed` or `training`; otherwise nothing is
    /// sent and `SourceNotReady` names the first offending source. Dataset
    /// locations are forwarded when the source has one.
    pub async fn start_training(
        &self,
        sources: &[TrainingSource],
        model_type: Option<&str>,
    ) -> Result<TrainingRun> {
        if sources.is_empty() {
            return Err(QueueError::invalid_config(
                "training requires at least one source",
            ));
        }

        let lookups = sources.iter().map(|source| self.resolve(source));
        let refs = join_all(lookups)
            .await
            .into_iter()
            .collect::<Result<Vec<TrainingSourceRef>>>()?;

        let training_id = Uuid::now_v7();
        let data = TrainingStartData {
            sources: refs,
            model_type: model_type.map(str::to_string),
            dataset_name: None,
        };

        self.notifier
            .update_progress(ProgressEvent::start(training_id, &data))
            .await
            .map_err(|e| QueueError::Notifier(format!("{e:#}")))?;

        info!(
            training_id = %training_id,
            source_count = data.sources.len(),
            model_type = ?data.model_type,
            "multi-source training started"
        );

        Ok(TrainingRun { training_id, data })
    }

    async fn resolve(&self, source: &TrainingSource) -> Result<TrainingSourceRef> {
        let not_ready = |reason: String| QueueError::SourceNotReady {
            source_type: source.source_type.clone(),
            job_id: source.job_id,
            reason,
        };

        let queue = self
            .sources
            .get(&source.source_type)
            .ok_or_else(|| not_ready("no queue registered for source type".to_string()))?;

        let job = match queue.source_job(source.job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return Err(not_ready("job not found".to_string())),
            Err(e) => {
                warn!(
                    source_type = %source.source_type,
                    job_id = %source.job_id,
                    error = %e,
                    "source lookup failed"
                );
                return Err(not_ready(format!("lookup failed: {e}")));
            }
        };

        if !job.status.is_ready() {
            return Err(not_ready(format!("job is {:?}", job.status).to_lowercase()));
        }

        Ok(TrainingSourceRef {
            source_type: source.source_type.clone(),
            job_id: source.job_id,
            path: job.result_path,
        })
    }
}
