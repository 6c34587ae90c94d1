//! Typed errors for the crawler queue.
//!
//! Uses `thiserror` for the queue's own errors. Collaborator traits
//! (providers, notifiers, sibling sources) return `anyhow::Error`, which the
//! processor folds into [`QueueError::Provider`] or [`QueueError::Notifier`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::jobs::JobStatus;

/// Errors produced by queue, processor, and aggregator operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Job submission rejected before a job was created
    #[error("invalid job config: {reason}")]
    InvalidConfig { reason: String },

    /// No provider service registered for the job's provider tag
    #[error("unknown provider: {provider}")]
    UnknownProvider { provider: String },

    /// A provider call failed (start, status, results, or transform)
    #[error("provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    /// The provider reported its own job as failed
    #[error("provider {provider} reported job {provider_job_id} failed: {message}")]
    ProviderJobFailed {
        provider: String,
        provider_job_id: String,
        message: String,
    },

    /// The provider job never left the pending state
    #[error("provider {provider} job {provider_job_id} still pending after {waited_ms}ms")]
    PollTimeout {
        provider: String,
        provider_job_id: String,
        waited_ms: u64,
    },

    /// The training progress notifier rejected the start event
    #[error("training notifier failed: {0}")]
    Notifier(String),

    /// A referenced training source is not ready
    #[error("source {source_type}/{job_id} not ready: {reason}")]
    SourceNotReady {
        source_type: String,
        job_id: Uuid,
        reason: String,
    },

    /// The queue is shutting down
    #[error("queue is shutting down")]
    ShutdownInProgress,

    /// Status polling was cut short by shutdown
    #[error("interrupted by shutdown while waiting on provider job {provider_job_id}")]
    Interrupted { provider_job_id: String },

    /// Job ID not known to this queue
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// The job is not in a state that can be claimed for processing
    #[error("job {job_id} cannot be processed while {status}")]
    NotClaimable { job_id: Uuid, status: JobStatus },

    /// A job was claimed after its attempt ceiling was already reached
    #[error("job {job_id} has no attempts left ({attempts} of {max_attempts} used)")]
    AttemptsExhausted {
        job_id: Uuid,
        attempts: u32,
        max_attempts: u32,
    },

    /// A status change outside the job state machine was attempted
    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Coarse classification of [`QueueError`], recorded alongside `last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidConfig,
    UnknownProvider,
    ProviderError,
    Notifier,
    SourceNotReady,
    ShutdownInProgress,
    /// Attempt interrupted by graceful shutdown - will retry
    Interrupted,
    NotFound,
    InvalidState,
}

impl ErrorKind {
    /// Whether a failed attempt of this kind may be retried.
    ///
    /// `UnknownProvider` is permanent: the registry will not change between
    /// attempts, so the job fails after its first attempt.
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            ErrorKind::ProviderError | ErrorKind::Notifier | ErrorKind::Interrupted
        )
    }
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueueError::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            QueueError::UnknownProvider { .. } => ErrorKind::UnknownProvider,
            QueueError::Provider { .. }
            | QueueError::ProviderJobFailed { .. }
            | QueueError::PollTimeout { .. } => ErrorKind::ProviderError,
            QueueError::Notifier(_) => ErrorKind::Notifier,
            QueueError::SourceNotReady { .. } => ErrorKind::SourceNotReady,
            QueueError::ShutdownInProgress => ErrorKind::ShutdownInProgress,
            QueueError::Interrupted { .. } => ErrorKind::Interrupted,
            QueueError::JobNotFound(_) => ErrorKind::NotFound,
            QueueError::NotClaimable { .. }
            | QueueError::AttemptsExhausted { .. }
            | QueueError::InvalidTransition { .. } => ErrorKind::InvalidState,
        }
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        QueueError::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub(crate) fn provider(provider: &str, error: anyhow::Error) -> Self {
        QueueError::Provider {
            provider: provider.to_string(),
            message: format!("{error:#}"),
        }
    }
}

/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_failures_are_retryable() {
        let err = QueueError::provider("jina", anyhow::anyhow!("connection reset"));
        assert_eq!(err.kind(), ErrorKind::ProviderError);
        assert!(err.kind().should_retry());
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn unknown_provider_is_permanent() {
        let err = QueueError::UnknownProvider {
            provider: "scrapy".into(),
        };
        assert!(!err.kind().should_retry());
    }

    #[test]
    fn interrupted_attempts_retry() {
        let err = QueueError::Interrupted {
            provider_job_id: "crawl-1".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Interrupted);
        assert!(err.kind().should_retry());
    }

    #[test]
    fn caller_errors_do_not_retry() {
        assert!(!QueueError::invalid_config("empty url").kind().should_retry());
        assert!(!QueueError::ShutdownInProgress.kind().should_retry());
        assert!(!QueueError::JobNotFound(Uuid::new_v4()).kind().should_retry());
    }

    #[test]
    fn exhausted_attempts_do_not_retry() {
        let err = QueueError::AttemptsExhausted {
            job_id: Uuid::new_v4(),
            attempts: 3,
            max_attempts: 3,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(!err.kind().should_retry());
        assert!(err.to_string().contains("no attempts left"));
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnknownProvider).unwrap();
        assert_eq!(json, "\"unknown_provider\"");
    }
}
