//! Interfaces to the remote services the pipeline talks to.
//!
//! Implementations live in [`crate::clients`]; tests provide scripted fakes.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{error::Result, job::JobHandle, job::JobStatus};

/// Raw reply from a message endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointReply {
    pub status: u16,
    /// Server-provided delay before the next attempt, if any.
    pub retry_after: Option<Duration>,
    pub body: Value,
}

impl EndpointReply {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body,
        }
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            status: 429,
            retry_after,
            body: Value::Null,
        }
    }

    pub fn status(status: u16, body: Value) -> Self {
        Self {
            status,
            retry_after: None,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

/// A destination that accepts one text message per request.
///
/// `Err` means the request never produced an HTTP reply (network failure).
#[async_trait]
pub trait MessageEndpoint: Send + Sync {
    fn name(&self) -> &str;

    async fn post(&self, content: &str) -> Result<EndpointReply>;
}

/// A provider that runs work as a remote job.
#[async_trait]
pub trait JobService<I, T>: Send + Sync {
    async fn submit(&self, input: &I) -> Result<JobHandle>;

    async fn poll(&self, job: &JobHandle) -> Result<JobStatus>;

    /// `None` when the job finished without producing anything usable.
    async fn fetch(&self, input: &I, job: &JobHandle) -> Result<Option<T>>;
}

/// A provider answering in a single request.
#[async_trait]
pub trait CallService<I, T>: Send + Sync {
    /// `None` when the provider answered but had nothing usable.
    async fn call(&self, input: &I) -> Result<Option<T>>;
}
