use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ensure_success, http_client, read_reply};
use crate::{config::Credentials, error::Result, service::CallService};

pub const BITLY_API_BASE: &str = "https://api-ssl.bitly.com/v4";

const BITLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Short link of a shorten response, `None` when the body has none.
pub fn short_link(body: &Value) -> Option<String> {
    body["link"]
        .as_str()
        .filter(|link| !link.is_empty())
        .map(str::to_string)
}

/// Turns long URLs into Bitly short links.
#[derive(Clone)]
pub struct BitlyShortener {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl BitlyShortener {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: http_client(BITLY_TIMEOUT),
            base_url: BITLY_API_BASE.to_string(),
            token: token.into(),
        }
    }

    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        Ok(Self::new(Credentials::require(
            &credentials.bitly_token,
            "BITLY_TOKEN",
        )?))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn shorten_url(&self) -> String {
        format!("{}/shorten", self.base_url.trim_end_matches('/'))
    }
}

impl std::fmt::Debug for BitlyShortener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitlyShortener")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CallService<String, String> for BitlyShortener {
    async fn call(&self, long_url: &String) -> Result<Option<String>> {
        let response = self
            .http
            .post(self.shorten_url())
            .bearer_auth(&self.token)
            .json(&json!({ "long_url": long_url }))
            .send()
            .await?;

        let (status, body) = read_reply(response).await?;
        ensure_success(status, &body)?;
        Ok(short_link(&body))
    }
}
