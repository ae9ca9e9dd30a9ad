use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::{ensure_success, http_client, read_reply};
use crate::{
    config::Credentials,
    error::Result,
    provider::{ApiFlavor, LlmProvider},
    service::CallService,
    types::{Summary, SummaryPrompt},
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 8000;
const DEFAULT_TEMPERATURE: f32 = 0.3;
// Long transcripts take minutes to summarize.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(300);

/// Request body for one completion in the provider's wire format.
pub fn request_body(
    flavor: ApiFlavor,
    model: &str,
    prompt: &SummaryPrompt,
    max_tokens: u32,
    temperature: f32,
) -> Value {
    match flavor {
        ApiFlavor::AnthropicMessages => json!({
            "model": model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "system": prompt.system,
            "messages": [
                { "role": "user", "content": prompt.user },
            ],
        }),
        ApiFlavor::ChatCompletions => json!({
            "model": model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
        }),
    }
}

/// Completion text of a response, `None` when it is missing or blank.
pub fn completion_text(flavor: ApiFlavor, body: &Value) -> Option<String> {
    let text = match flavor {
        ApiFlavor::AnthropicMessages => body["content"]
            .as_array()?
            .iter()
            .filter(|block| block["type"] == "text")
            .filter_map(|block| block["text"].as_str())
            .collect::<Vec<_>>()
            .join(""),
        ApiFlavor::ChatCompletions => body["choices"][0]["message"]["content"]
            .as_str()?
            .to_string(),
    };

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Text generation against one [`LlmProvider`].
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    provider: LlmProvider,
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatClient {
    pub fn new(provider: LlmProvider, api_key: impl Into<String>) -> Self {
        let config = provider.config();
        Self {
            http: http_client(COMPLETION_TIMEOUT),
            provider,
            api_key: api_key.into(),
            api_url: config.api_url.to_string(),
            model: config.model.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn from_credentials(provider: LlmProvider, credentials: &Credentials) -> Result<Self> {
        Ok(Self::new(provider, provider.api_key(credentials)?))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CallService<SummaryPrompt, Summary> for ChatClient {
    async fn call(&self, prompt: &SummaryPrompt) -> Result<Option<Summary>> {
        let flavor = self.provider.config().flavor;
        let body = request_body(
            flavor,
            &self.model,
            prompt,
            self.max_tokens,
            self.temperature,
        );

        info!(
            provider = self.provider.name(),
            model = %self.model,
            prompt_chars = prompt.user.chars().count(),
            "Requesting summary"
        );

        let request = self.http.post(&self.api_url).json(&body);
        let request = match flavor {
            ApiFlavor::AnthropicMessages => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            ApiFlavor::ChatCompletions => request.bearer_auth(&self.api_key),
        };

        let (status, reply) = read_reply(request.send().await?).await?;
        ensure_success(status, &reply)?;

        Ok(completion_text(flavor, &reply).map(|text| Summary {
            text,
            provider: self.provider.slug().to_string(),
            model: self.model.clone(),
        }))
    }
}
