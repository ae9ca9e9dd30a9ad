//! Rate-limit aware delivery of a single chunk.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    chunk::Chunk,
    config::DeliveryConfig,
    error::{Result, TubeDigestError},
    service::MessageEndpoint,
    suspend::sleep_or_cancel,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success { response: Value },
    RateLimited { retry_delay_ms: u64 },
    Failed { error: String },
}

/// One send try for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryAttempt {
    pub chunk_index: usize,
    pub attempt_number: u32,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Every attempt made for a chunk plus the terminal result.
#[derive(Debug)]
pub struct SendOutcome {
    pub attempts: Vec<DeliveryAttempt>,
    pub result: Result<Value>,
}

impl SendOutcome {
    pub fn retries(&self) -> usize {
        self.attempts.len().saturating_sub(1)
    }
}

/// Sends a chunk, waiting out 429 responses up to `max_attempts` tries.
///
/// Any other non-2xx status and any transport error end the chunk at once.
#[derive(Debug, Clone)]
pub struct RateLimitedSender {
    max_attempts: u32,
    default_retry_delay: Duration,
}

impl RateLimitedSender {
    pub fn new(max_attempts: u32, default_retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            default_retry_delay,
        }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self::new(config.max_attempts, config.default_retry_delay)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn send(
        &self,
        chunk: &Chunk,
        endpoint: &dyn MessageEndpoint,
        cancel: &CancellationToken,
    ) -> SendOutcome {
        let mut attempts = Vec::new();
        let result = self.send_inner(chunk, endpoint, cancel, &mut attempts).await;
        SendOutcome { attempts, result }
    }

    async fn send_inner(
        &self,
        chunk: &Chunk,
        endpoint: &dyn MessageEndpoint,
        cancel: &CancellationToken,
        attempts: &mut Vec<DeliveryAttempt>,
    ) -> Result<Value> {
        for attempt_number in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Err(TubeDigestError::Cancelled);
            }

            debug!(
                endpoint = endpoint.name(),
                chunk = chunk.index,
                attempt = attempt_number,
                length = chunk.length,
                "Sending chunk"
            );

            let posted = tokio::select! {
                biased;

                _ = cancel.cancelled() => return Err(TubeDigestError::Cancelled),
                posted = endpoint.post(&chunk.content) => posted,
            };
            let reply = match posted {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(chunk = chunk.index, error = %err, "Chunk send failed");
                    attempts.push(DeliveryAttempt {
                        chunk_index: chunk.index,
                        attempt_number,
                        outcome: AttemptOutcome::Failed {
                            error: err.to_string(),
                        },
                    });
                    return Err(err);
                }
            };

            if reply.is_success() {
                attempts.push(DeliveryAttempt {
                    chunk_index: chunk.index,
                    attempt_number,
                    outcome: AttemptOutcome::Success {
                        response: reply.body.clone(),
                    },
                });
                return Ok(reply.body);
            }

            if reply.is_rate_limited() {
                let delay = reply.retry_after.unwrap_or(self.default_retry_delay);
                attempts.push(DeliveryAttempt {
                    chunk_index: chunk.index,
                    attempt_number,
                    outcome: AttemptOutcome::RateLimited {
                        retry_delay_ms: delay.as_millis() as u64,
                    },
                });

                if attempt_number == self.max_attempts {
                    break;
                }

                warn!(
                    chunk = chunk.index,
                    attempt = attempt_number,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, retrying"
                );
                sleep_or_cancel(delay, cancel).await?;
                continue;
            }

            let err = TubeDigestError::RemoteRejected {
                status: reply.status,
                body: reply.body.to_string(),
            };
            warn!(chunk = chunk.index, status = reply.status, "Chunk rejected");
            attempts.push(DeliveryAttempt {
                chunk_index: chunk.index,
                attempt_number,
                outcome: AttemptOutcome::Failed {
                    error: err.to_string(),
                },
            });
            return Err(err);
        }

        Err(TubeDigestError::RateLimitExhausted {
            attempts: self.max_attempts,
        })
    }
}
