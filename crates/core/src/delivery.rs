//! Ordered, stop-at-first-failure delivery of a long message.

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    chunk::{self, Chunk},
    config::DeliveryConfig,
    error::{ErrorKind, Result, TubeDigestError},
    sender::{DeliveryAttempt, RateLimitedSender},
    service::MessageEndpoint,
};

#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered {
        chunks_sent: usize,
        /// One response per chunk, in send order.
        responses: Vec<Value>,
    },
    Failed {
        /// 1-based index of the chunk that failed.
        failed_chunk_index: usize,
        chunks_succeeded: usize,
        responses: Vec<Value>,
        error: TubeDigestError,
    },
}

#[derive(Debug)]
pub struct DeliveryReport {
    pub chunk_count: usize,
    pub attempts: Vec<DeliveryAttempt>,
    pub outcome: DeliveryOutcome,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered { .. })
    }

    pub fn chunks_succeeded(&self) -> usize {
        match &self.outcome {
            DeliveryOutcome::Delivered { chunks_sent, .. } => *chunks_sent,
            DeliveryOutcome::Failed {
                chunks_succeeded, ..
            } => *chunks_succeeded,
        }
    }

    pub fn summary(&self) -> DeliverySummary {
        let (success, failed_chunk_index, error, error_kind, responses) = match &self.outcome {
            DeliveryOutcome::Delivered { responses, .. } => (true, None, None, None, responses),
            DeliveryOutcome::Failed {
                failed_chunk_index,
                responses,
                error,
                ..
            } => (
                false,
                Some(*failed_chunk_index),
                Some(error.to_string()),
                Some(error.kind()),
                responses,
            ),
        };

        DeliverySummary {
            success,
            chunk_count: self.chunk_count,
            chunks_sent: self.chunks_succeeded(),
            failed_chunk_index,
            error,
            error_kind,
            message_ids: responses
                .iter()
                .filter_map(|r| r.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
            attempts: self.attempts.clone(),
        }
    }

    /// Turn a failed delivery into an error carrying the partial progress.
    pub fn into_result(self) -> Result<DeliverySummary> {
        let summary = self.summary();
        match self.outcome {
            DeliveryOutcome::Delivered { .. } => Ok(summary),
            DeliveryOutcome::Failed {
                failed_chunk_index,
                chunks_succeeded,
                error,
                ..
            } => Err(TubeDigestError::ChunkDeliveryFailed {
                failed_chunk_index,
                chunks_succeeded,
                source: Box::new(error),
            }),
        }
    }
}

/// Serializable view of a [`DeliveryReport`].
#[derive(Debug, Clone, Serialize)]
pub struct DeliverySummary {
    pub success: bool,
    pub chunk_count: usize,
    pub chunks_sent: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_chunk_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub message_ids: Vec<String>,
    pub attempts: Vec<DeliveryAttempt>,
}

/// Plans chunks once and sends them strictly one after another.
#[derive(Debug, Clone)]
pub struct SequentialDelivery {
    max_chunk_size: usize,
    sender: RateLimitedSender,
}

impl SequentialDelivery {
    pub fn new(max_chunk_size: usize, sender: RateLimitedSender) -> Self {
        Self {
            max_chunk_size,
            sender,
        }
    }

    pub fn from_config(config: &DeliveryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            config.max_chunk_size,
            RateLimitedSender::from_config(config),
        ))
    }

    pub fn plan(&self, text: &str) -> Vec<Chunk> {
        chunk::plan(text, self.max_chunk_size)
    }

    pub async fn deliver(
        &self,
        text: &str,
        endpoint: &dyn MessageEndpoint,
        cancel: &CancellationToken,
    ) -> DeliveryReport {
        let chunks = self.plan(text);
        let chunk_count = chunks.len();
        let mut attempts = Vec::new();
        let mut responses = Vec::with_capacity(chunk_count);

        for chunk in &chunks {
            if chunk.length > self.max_chunk_size {
                let error = TubeDigestError::SizeViolation {
                    index: chunk.index,
                    length: chunk.length,
                    limit: self.max_chunk_size,
                };
                return failed(chunk_count, attempts, responses, chunk.index, error);
            }

            info!(
                endpoint = endpoint.name(),
                "Sending chunk {}/{} ({} chars)",
                chunk.index,
                chunk_count,
                chunk.length
            );

            let outcome = self.sender.send(chunk, endpoint, cancel).await;
            attempts.extend(outcome.attempts);

            match outcome.result {
                Ok(response) => responses.push(response),
                Err(error) => {
                    warn!(
                        chunk = chunk.index,
                        succeeded = responses.len(),
                        error = %error,
                        "Delivery aborted"
                    );
                    return failed(chunk_count, attempts, responses, chunk.index, error);
                }
            }
        }

        DeliveryReport {
            chunk_count,
            attempts,
            outcome: DeliveryOutcome::Delivered {
                chunks_sent: responses.len(),
                responses,
            },
        }
    }
}

fn failed(
    chunk_count: usize,
    attempts: Vec<DeliveryAttempt>,
    responses: Vec<Value>,
    failed_chunk_index: usize,
    error: TubeDigestError,
) -> DeliveryReport {
    DeliveryReport {
        chunk_count,
        attempts,
        outcome: DeliveryOutcome::Failed {
            failed_chunk_index,
            chunks_succeeded: responses.len(),
            responses,
            error,
        },
    }
}
