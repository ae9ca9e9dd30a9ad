//! Explicit configuration handed to the pipeline at construction time.

use std::time::Duration;

use crate::{
    error::{Result, TubeDigestError},
    provider::LlmProvider,
};

pub const DEFAULT_MAX_CHUNK_SIZE: usize = 2000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_MAX_WAIT: Duration = Duration::from_secs(60);
pub const DEFAULT_LANGUAGE: &str = "ko";
pub const DEFAULT_FALLBACK_LANGUAGES: &[&str] = &["en"];

/// Chunking and rate-limit retry settings for message delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub max_chunk_size: usize,
    /// Total send attempts per chunk, the first one included.
    pub max_attempts: u32,
    /// Used when a rate-limited response carries no retry hint.
    pub default_retry_delay: Duration,
}

impl DeliveryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(TubeDigestError::InvalidInput {
                reason: "max_chunk_size must be > 0".to_string(),
            });
        }
        if self.max_attempts == 0 {
            return Err(TubeDigestError::InvalidInput {
                reason: "max_attempts must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            default_retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Polling settings for asynchronous provider jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Upper bound on time spent polling one job.
    pub max_wait: Duration,
    /// How long a provider may hold the submit request open (Apify `waitForFinish`).
    pub wait_for_finish: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_POLL_MAX_WAIT,
            wait_for_finish: Duration::from_secs(120),
        }
    }
}

/// API credentials, resolved once before the pipeline is built.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub apify_token: Option<String>,
    pub youtube_api_key: Option<String>,
    pub discord_bot_token: Option<String>,
    pub discord_channel_id: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub xai_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub bitly_token: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(key))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        Self {
            apify_token: get(&["APIFY", "APIFY_TOKEN"]),
            youtube_api_key: get(&["YOUTUBE_API_KEY"]),
            discord_bot_token: get(&["DISCORD_BOT_TOKEN"]),
            discord_channel_id: get(&["DISCORD_CHANNEL_ID"]),
            anthropic_api_key: get(&["ANTHROPIC_API_KEY"]),
            xai_api_key: get(&["XAI_API_KEY"]),
            openai_api_key: get(&["OPENAI_API_KEY"]),
            gemini_api_key: get(&["GEMINI_API_KEY"]),
            bitly_token: get(&["BITLY_TOKEN"]),
        }
    }

    pub fn require<'a>(value: &'a Option<String>, env_var: &str) -> Result<&'a str> {
        value
            .as_deref()
            .ok_or_else(|| TubeDigestError::MissingCredential {
                env_var: env_var.to_string(),
            })
    }
}

// Secrets stay out of logs and debug output.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "set" } else { "unset" };
        f.debug_struct("Credentials")
            .field("apify_token", &mask(&self.apify_token))
            .field("youtube_api_key", &mask(&self.youtube_api_key))
            .field("discord_bot_token", &mask(&self.discord_bot_token))
            .field("discord_channel_id", &self.discord_channel_id)
            .field("anthropic_api_key", &mask(&self.anthropic_api_key))
            .field("xai_api_key", &mask(&self.xai_api_key))
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("gemini_api_key", &mask(&self.gemini_api_key))
            .field("bitly_token", &mask(&self.bitly_token))
            .finish()
    }
}

/// Everything the YouTube summary pipeline needs to be assembled.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub delivery: DeliveryConfig,
    pub poll: PollConfig,
    pub credentials: Credentials,
    pub language: String,
    /// Summary providers in fallback order.
    pub providers: Vec<LlmProvider>,
    /// Replaces the built-in summary guide when set.
    pub summary_guide: Option<String>,
    pub with_video_info: bool,
    /// Replace links in the summary with short links before notifying.
    pub shorten_links: bool,
    pub notify: bool,
}

impl PipelineConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            delivery: DeliveryConfig::default(),
            poll: PollConfig::default(),
            credentials,
            language: DEFAULT_LANGUAGE.to_string(),
            providers: LlmProvider::all().to_vec(),
            summary_guide: None,
            with_video_info: false,
            shorten_links: false,
            notify: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn credentials_fall_back_to_alternate_names() {
        let env: HashMap<&str, &str> = [
            ("APIFY_TOKEN", "apify-secret"),
            ("DISCORD_CHANNEL_ID", " 1234 "),
            ("XAI_API_KEY", ""),
        ]
        .into_iter()
        .collect();

        let creds = Credentials::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(creds.apify_token.as_deref(), Some("apify-secret"));
        assert_eq!(creds.discord_channel_id.as_deref(), Some("1234"));
        assert_eq!(creds.xai_api_key, None);
    }

    #[test]
    fn debug_output_masks_secrets() {
        let creds = Credentials {
            discord_bot_token: Some("very-secret".into()),
            ..Default::default()
        };
        let rendered = format!("{creds:?}");

        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("discord_bot_token: \"set\""));
    }

    #[test]
    fn missing_credential_names_the_variable() {
        let err = Credentials::require(&None, "DISCORD_BOT_TOKEN").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing credential: DISCORD_BOT_TOKEN is not set"
        );
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = DeliveryConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(DeliveryConfig::default().validate().is_ok());
    }
}
