//! Remote long-running jobs and their observed lifecycle.

use serde::{Deserialize, Serialize};

/// Status of a remote job as reported by its provider.
///
/// `Submitted` and `Running` are the only non-terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    Running,
    Succeeded,
    Failed,
    Aborted,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Submitted | JobStatus::Running)
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            JobStatus::Failed | JobStatus::Aborted | JobStatus::TimedOut
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Submitted => "submitted",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Aborted => "aborted",
            JobStatus::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// Handle returned by a provider when a job is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
    /// Status reported together with the submission, if any.
    pub status: JobStatus,
    /// Opaque pointer to where the result can be fetched (e.g. a dataset id).
    pub result_location: Option<String>,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Submitted,
            result_location: None,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_result_location(mut self, location: impl Into<String>) -> Self {
        self.result_location = Some(location.into());
        self
    }
}

/// A job as tracked by the fallback runner while it is being polled.
#[derive(Debug, Clone, Serialize)]
pub struct AsyncJob {
    pub handle: JobHandle,
    pub status: JobStatus,
    pub polls: u32,
}

impl AsyncJob {
    pub fn started(handle: JobHandle) -> Self {
        Self {
            status: handle.status,
            handle,
            polls: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.handle.id
    }

    /// Record a polled status. Terminal states are sticky.
    pub fn observe(&mut self, status: JobStatus) {
        self.polls += 1;
        if !self.status.is_terminal() {
            self.status = status;
        }
    }

    pub fn time_out(&mut self) {
        if !self.status.is_terminal() {
            self.status = JobStatus::TimedOut;
        }
    }
}
