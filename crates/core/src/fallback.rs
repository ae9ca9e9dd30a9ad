//! Ordered provider fallback with async job polling.
//!
//! Providers are tried strictly in declared order. A provider that errors,
//! returns nothing, or whose job ends badly hands over to the next one; only
//! when every provider has been tried does the whole operation fail.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::PollConfig,
    error::{ErrorKind, Result, TubeDigestError},
    job::{AsyncJob, JobStatus},
    service::{CallService, JobService},
    suspend::sleep_or_cancel,
};

/// Result of trying one provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderAttemptResult<T> {
    Succeeded { data: T },
    NoData,
    ProviderError { kind: ErrorKind, message: String },
    JobFailed { job_id: String, status: JobStatus },
}

impl<T> ProviderAttemptResult<T> {
    fn provider_error(err: &TubeDigestError) -> Self {
        ProviderAttemptResult::ProviderError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Kind and reason of a failed attempt, `None` on success.
    fn failure(&self) -> Option<(ErrorKind, String)> {
        match self {
            ProviderAttemptResult::Succeeded { .. } => None,
            ProviderAttemptResult::NoData => {
                Some((ErrorKind::InvalidResponse, "no data returned".to_string()))
            }
            ProviderAttemptResult::ProviderError { kind, message } => {
                Some((*kind, message.clone()))
            }
            ProviderAttemptResult::JobFailed { job_id, status } => {
                let err = TubeDigestError::JobTerminalFailure {
                    job_id: job_id.clone(),
                    status: *status,
                };
                Some((err.kind(), err.to_string()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub kind: ErrorKind,
    pub reason: String,
}

/// How a provider is reached.
pub enum ProviderBackend<I, T> {
    Job(Arc<dyn JobService<I, T>>),
    Call(Arc<dyn CallService<I, T>>),
}

impl<I, T> Clone for ProviderBackend<I, T> {
    fn clone(&self) -> Self {
        match self {
            ProviderBackend::Job(service) => ProviderBackend::Job(Arc::clone(service)),
            ProviderBackend::Call(service) => ProviderBackend::Call(Arc::clone(service)),
        }
    }
}

/// A named entry in a fallback chain.
pub struct FallbackProvider<I, T> {
    name: String,
    backend: ProviderBackend<I, T>,
}

impl<I, T> Clone for FallbackProvider<I, T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            backend: self.backend.clone(),
        }
    }
}

impl<I, T> FallbackProvider<I, T>
where
    I: Sync,
    T: Send,
{
    pub fn job(name: impl Into<String>, service: Arc<dyn JobService<I, T>>) -> Self {
        Self {
            name: name.into(),
            backend: ProviderBackend::Job(service),
        }
    }

    pub fn call(name: impl Into<String>, service: Arc<dyn CallService<I, T>>) -> Self {
        Self {
            name: name.into(),
            backend: ProviderBackend::Call(service),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Try this provider once. Only cancellation is returned as `Err`, and it
    /// ends the attempt even while a request is in flight.
    pub async fn attempt(
        &self,
        input: &I,
        poll: &PollConfig,
        cancel: &CancellationToken,
    ) -> Result<ProviderAttemptResult<T>> {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(TubeDigestError::Cancelled),
            result = self.try_backend(input, poll, cancel) => result,
        }
    }

    async fn try_backend(
        &self,
        input: &I,
        poll: &PollConfig,
        cancel: &CancellationToken,
    ) -> Result<ProviderAttemptResult<T>> {
        match &self.backend {
            ProviderBackend::Call(service) => Ok(match service.call(input).await {
                Ok(Some(data)) => ProviderAttemptResult::Succeeded { data },
                Ok(None) => ProviderAttemptResult::NoData,
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => ProviderAttemptResult::provider_error(&err),
            }),
            ProviderBackend::Job(service) => self.run_job(service.as_ref(), input, poll, cancel).await,
        }
    }

    async fn run_job(
        &self,
        service: &dyn JobService<I, T>,
        input: &I,
        poll: &PollConfig,
        cancel: &CancellationToken,
    ) -> Result<ProviderAttemptResult<T>> {
        let handle = match service.submit(input).await {
            Ok(handle) => handle,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                return Ok(ProviderAttemptResult::provider_error(&err));
            }
        };

        let mut job = AsyncJob::started(handle);
        info!(provider = %self.name, job_id = job.id(), status = %job.status, "Job started");

        let deadline = Instant::now() + poll.max_wait;
        while !job.status.is_terminal() {
            if Instant::now() >= deadline {
                warn!(provider = %self.name, job_id = job.id(), "Job did not finish in time");
                job.time_out();
                break;
            }

            sleep_or_cancel(poll.interval, cancel).await?;

            match service.poll(&job.handle).await {
                Ok(status) => {
                    job.observe(status);
                    debug!(provider = %self.name, job_id = job.id(), status = %status, polls = job.polls, "Job polled");
                }
                // A failed status check is not a verdict on the job; keep polling.
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    warn!(provider = %self.name, job_id = job.id(), error = %err, "Job poll failed")
                }
            }
        }

        if job.status.is_failure() {
            warn!(provider = %self.name, job_id = job.id(), status = %job.status, "Job ended without a result");
            return Ok(ProviderAttemptResult::JobFailed {
                job_id: job.id().to_string(),
                status: job.status,
            });
        }

        Ok(match service.fetch(input, &job.handle).await {
            Ok(Some(data)) => ProviderAttemptResult::Succeeded { data },
            Ok(None) => ProviderAttemptResult::NoData,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => ProviderAttemptResult::provider_error(&err),
        })
    }
}

/// One line of the fallback log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAttemptLog {
    pub provider: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FallbackSuccess<T> {
    pub provider: String,
    pub data: T,
    pub attempts: Vec<ProviderAttemptLog>,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderFallbackRunner {
    poll: PollConfig,
}

impl ProviderFallbackRunner {
    pub fn new(poll: PollConfig) -> Self {
        Self { poll }
    }

    pub async fn run<I, T>(
        &self,
        providers: &[FallbackProvider<I, T>],
        input: &I,
        cancel: &CancellationToken,
    ) -> Result<FallbackSuccess<T>>
    where
        I: Sync,
        T: Send,
    {
        let mut attempts = Vec::with_capacity(providers.len());
        let mut failures = Vec::new();

        for provider in providers {
            if cancel.is_cancelled() {
                return Err(TubeDigestError::Cancelled);
            }

            info!(provider = provider.name(), "Trying provider");
            let result = provider.attempt(input, &self.poll, cancel).await?;

            match result.failure() {
                None => {
                    attempts.push(ProviderAttemptLog {
                        provider: provider.name().to_string(),
                        succeeded: true,
                        reason: None,
                    });
                    if let ProviderAttemptResult::Succeeded { data } = result {
                        info!(provider = provider.name(), "Provider succeeded");
                        return Ok(FallbackSuccess {
                            provider: provider.name().to_string(),
                            data,
                            attempts,
                        });
                    }
                }
                Some((kind, reason)) => {
                    warn!(provider = provider.name(), reason = %reason, "Provider failed, falling back");
                    attempts.push(ProviderAttemptLog {
                        provider: provider.name().to_string(),
                        succeeded: false,
                        reason: Some(reason.clone()),
                    });
                    failures.push(ProviderFailure {
                        provider: provider.name().to_string(),
                        kind,
                        reason,
                    });
                }
            }
        }

        Err(TubeDigestError::ProviderExhausted { failures })
    }
}
