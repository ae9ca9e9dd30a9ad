use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde_json::{Value, json};

use super::{http_client, read_reply};
use crate::{
    config::Credentials,
    error::Result,
    service::{EndpointReply, MessageEndpoint},
};

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

const DISCORD_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts messages into one Discord channel as a bot.
#[derive(Clone)]
pub struct DiscordChannel {
    http: reqwest::Client,
    base_url: String,
    channel_id: String,
    token: String,
}

impl DiscordChannel {
    pub fn new(token: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            http: http_client(DISCORD_TIMEOUT),
            base_url: DISCORD_API_BASE.to_string(),
            channel_id: channel_id.into(),
            token: token.into(),
        }
    }

    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        let token = Credentials::require(&credentials.discord_bot_token, "DISCORD_BOT_TOKEN")?;
        let channel_id =
            Credentials::require(&credentials.discord_channel_id, "DISCORD_CHANNEL_ID")?;
        Ok(Self::new(token, channel_id))
    }

    pub fn with_channel_id(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/channels/{}/messages",
            self.base_url.trim_end_matches('/'),
            self.channel_id
        )
    }
}

impl std::fmt::Debug for DiscordChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordChannel")
            .field("base_url", &self.base_url)
            .field("channel_id", &self.channel_id)
            .finish_non_exhaustive()
    }
}

/// Retry hint of a rate-limited reply: the `Retry-After` header, else the
/// JSON `retry_after` field. Both are in seconds.
pub fn parse_retry_after(header: Option<&str>, body: &Value) -> Option<Duration> {
    let seconds = header
        .and_then(|value| value.trim().parse::<f64>().ok())
        .or_else(|| body.get("retry_after").and_then(Value::as_f64))?;
    Duration::try_from_secs_f64(seconds).ok()
}

#[async_trait]
impl MessageEndpoint for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn post(&self, content: &str) -> Result<EndpointReply> {
        let response = self
            .http
            .post(self.messages_url())
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({ "content": content }))
            .send()
            .await?;

        let header = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let (status, body) = read_reply(response).await?;

        let retry_after = if status == 429 {
            parse_retry_after(header.as_deref(), &body)
        } else {
            None
        };

        Ok(EndpointReply {
            status,
            retry_after,
            body,
        })
    }
}
