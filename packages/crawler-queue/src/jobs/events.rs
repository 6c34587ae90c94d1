use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{JobPriority, JobStatus};
use crate::error::ErrorKind;

/// Job lifecycle events.
///
/// These are facts about the job lifecycle, published on the queue's
/// broadcast channel for status reporting. Nothing in the processing path
/// depends on anyone listening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    /// A job was accepted by `add_job`.
    Enqueued {
        job_id: Uuid,
        provider: String,
        priority: JobPriority,
    },

    /// An execution attempt started.
    Started {
        job_id: Uuid,
        provider: String,
        attempt: u32,
    },

    /// The job reached `completed` or `training`.
    Succeeded {
        job_id: Uuid,
        status: JobStatus,
        attempt: u32,
        duration_ms: u64,
    },

    /// An attempt failed.
    Failed {
        job_id: Uuid,
        error: String,
        error_kind: ErrorKind,
        attempt: u32,
        will_retry: bool,
    },

    /// The job failed terminally (attempts exhausted or non-retryable error).
    Exhausted {
        job_id: Uuid,
        total_attempts: u32,
        final_error: String,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::Enqueued { job_id, .. }
            | JobEvent::Started { job_id, .. }
            | JobEvent::Succeeded { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Exhausted { job_id, .. } => *job_id,
        }
    }
}
