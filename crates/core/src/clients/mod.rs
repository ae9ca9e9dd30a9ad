//! reqwest implementations of the collaborator traits in [`crate::service`].

mod apify;
mod bitly;
mod discord;
mod llm;
mod youtube;

pub use apify::{
    APIFY_API_BASE, ApifyActor, DEFAULT_TRANSCRIPT_ACTORS, actor_input, parse_run_status,
    transcript_from_items,
};
pub use bitly::{BITLY_API_BASE, BitlyShortener};
pub use discord::{DISCORD_API_BASE, DiscordChannel, parse_retry_after};
pub use llm::{ChatClient, completion_text, request_body};
pub use youtube::{
    YOUTUBE_API_BASE, YouTubeDataClient, extract_video_id, video_info_from_response, watch_url,
};

use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::error::{Result, TubeDigestError};

/// Request timeout for calls that are expected to answer quickly.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// A client whose requests fail with a transport error after `timeout`.
fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|err| {
            warn!(error = %err, "Failed to build HTTP client, using defaults");
            reqwest::Client::new()
        })
}

/// Status code and body of a response; non-JSON bodies become a JSON string.
async fn read_reply(response: reqwest::Response) -> Result<(u16, Value)> {
    let status = response.status().as_u16();
    let text = response.text().await?;
    let body = match serde_json::from_str(&text) {
        Ok(body) => body,
        Err(_) if text.is_empty() => Value::Null,
        Err(_) => Value::String(text),
    };
    Ok((status, body))
}

/// Fail with `RemoteRejected` unless the status is 2xx.
fn ensure_success(status: u16, body: &Value) -> Result<()> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    let body = match body {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    Err(TubeDigestError::RemoteRejected { status, body })
}
