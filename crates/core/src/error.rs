use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{fallback::ProviderFailure, job::JobStatus};

/// Coarse classification of every failure the pipeline can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SizeViolation,
    RateLimitExhausted,
    TransportError,
    RemoteRejected,
    ProviderExhausted,
    JobTerminalFailure,
    RequiredStageFailed,
    Cancelled,
    Configuration,
    InvalidInput,
    InvalidResponse,
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::SizeViolation => "size_violation",
            ErrorKind::RateLimitExhausted => "rate_limit_exhausted",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::RemoteRejected => "remote_rejected",
            ErrorKind::ProviderExhausted => "provider_exhausted",
            ErrorKind::JobTerminalFailure => "job_terminal_failure",
            ErrorKind::RequiredStageFailed => "required_stage_failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Configuration => "configuration",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum TubeDigestError {
    #[error("Chunk {index} is {length} characters, over the {limit} character limit")]
    SizeViolation {
        index: usize,
        length: usize,
        limit: usize,
    },

    #[error("Still rate limited after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Remote rejected the request with status {status}: {body}")]
    RemoteRejected { status: u16, body: String },

    #[error("All providers failed: {}", format_failures(.failures))]
    ProviderExhausted { failures: Vec<ProviderFailure> },

    #[error("Job {job_id} ended with status {status}")]
    JobTerminalFailure { job_id: String, status: JobStatus },

    #[error("Required stage '{stage}' failed ({kind}): {message}")]
    RequiredStageFailed {
        stage: String,
        kind: ErrorKind,
        message: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Chunk {failed_chunk_index} failed after {chunks_succeeded} delivered chunk(s)")]
    ChunkDeliveryFailed {
        failed_chunk_index: usize,
        chunks_succeeded: usize,
        #[source]
        source: Box<TubeDigestError>,
    },

    #[error("Missing credential: {env_var} is not set")]
    MissingCredential { env_var: String },

    #[error("Stage '{stage}' has not produced an output")]
    MissingStageOutput { stage: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Invalid response: {reason}")]
    InvalidResponse { reason: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TubeDigestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TubeDigestError::SizeViolation { .. } => ErrorKind::SizeViolation,
            TubeDigestError::RateLimitExhausted { .. } => ErrorKind::RateLimitExhausted,
            TubeDigestError::Transport { .. } => ErrorKind::TransportError,
            TubeDigestError::RemoteRejected { .. } => ErrorKind::RemoteRejected,
            TubeDigestError::ProviderExhausted { .. } => ErrorKind::ProviderExhausted,
            TubeDigestError::JobTerminalFailure { .. } => ErrorKind::JobTerminalFailure,
            TubeDigestError::RequiredStageFailed { .. } => ErrorKind::RequiredStageFailed,
            TubeDigestError::Cancelled => ErrorKind::Cancelled,
            TubeDigestError::ChunkDeliveryFailed { source, .. } => source.kind(),
            TubeDigestError::MissingCredential { .. } => ErrorKind::Configuration,
            TubeDigestError::MissingStageOutput { .. } => ErrorKind::InvalidInput,
            TubeDigestError::InvalidInput { .. } => ErrorKind::InvalidInput,
            TubeDigestError::InvalidResponse { .. } => ErrorKind::InvalidResponse,
            TubeDigestError::Json(_) => ErrorKind::InvalidResponse,
            TubeDigestError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// The `source()` chain below this error, rendered to text.
    pub fn causes(&self) -> Vec<String> {
        let mut causes = Vec::new();
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            causes.push(cause.to_string());
            current = cause.source();
        }
        causes
    }
}

impl From<reqwest::Error> for TubeDigestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TubeDigestError::InvalidResponse {
                reason: err.to_string(),
            }
        } else {
            TubeDigestError::Transport {
                message: err.to_string(),
            }
        }
    }
}

fn format_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers configured".to_string();
    }
    failures
        .iter()
        .map(|f| format!("{}: {}", f.provider, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, TubeDigestError>;
