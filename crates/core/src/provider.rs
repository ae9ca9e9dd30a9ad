use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    config::Credentials,
    error::{Result, TubeDigestError},
};

/// Wire protocol spoken by a text-generation provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiFlavor {
    /// Anthropic messages API (`x-api-key`, `system` field, `content` blocks).
    AnthropicMessages,
    /// OpenAI-compatible chat completions with bearer auth.
    ChatCompletions,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Anthropic,
    Grok,
    Openai,
    Gemini,
}

pub struct ProviderConfig {
    pub api_url: &'static str,
    pub model: &'static str,
    pub env_var: &'static str,
    pub flavor: ApiFlavor,
}

impl LlmProvider {
    /// Every provider, in default fallback order.
    pub fn all() -> &'static [LlmProvider] {
        &[
            LlmProvider::Anthropic,
            LlmProvider::Grok,
            LlmProvider::Openai,
            LlmProvider::Gemini,
        ]
    }

    pub fn config(&self) -> ProviderConfig {
        match self {
            LlmProvider::Anthropic => ProviderConfig {
                api_url: "https://api.anthropic.com/v1/messages",
                model: "claude-sonnet-4-20250514",
                env_var: "ANTHROPIC_API_KEY",
                flavor: ApiFlavor::AnthropicMessages,
            },
            LlmProvider::Grok => ProviderConfig {
                api_url: "https://api.x.ai/v1/chat/completions",
                model: "grok-4-fast",
                env_var: "XAI_API_KEY",
                flavor: ApiFlavor::ChatCompletions,
            },
            LlmProvider::Openai => ProviderConfig {
                api_url: "https://api.openai.com/v1/chat/completions",
                model: "gpt-5.1",
                env_var: "OPENAI_API_KEY",
                flavor: ApiFlavor::ChatCompletions,
            },
            LlmProvider::Gemini => ProviderConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                model: "gemini-3-pro",
                env_var: "GEMINI_API_KEY",
                flavor: ApiFlavor::ChatCompletions,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::Grok => "Grok",
            LlmProvider::Openai => "OpenAI",
            LlmProvider::Gemini => "Gemini",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Grok => "grok",
            LlmProvider::Openai => "openai",
            LlmProvider::Gemini => "gemini",
        }
    }

    pub fn credential<'a>(&self, credentials: &'a Credentials) -> Option<&'a str> {
        let key = match self {
            LlmProvider::Anthropic => &credentials.anthropic_api_key,
            LlmProvider::Grok => &credentials.xai_api_key,
            LlmProvider::Openai => &credentials.openai_api_key,
            LlmProvider::Gemini => &credentials.gemini_api_key,
        };
        key.as_deref()
    }

    /// The API key for this provider, or `MissingCredential` naming its variable.
    pub fn api_key<'a>(&self, credentials: &'a Credentials) -> Result<&'a str> {
        self.credential(credentials)
            .ok_or_else(|| TubeDigestError::MissingCredential {
                env_var: self.config().env_var.to_string(),
            })
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LlmProvider {
    type Err = TubeDigestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic),
            "grok" | "xai" => Ok(LlmProvider::Grok),
            "openai" => Ok(LlmProvider::Openai),
            "gemini" => Ok(LlmProvider::Gemini),
            other => Err(TubeDigestError::InvalidInput {
                reason: format!("unknown provider '{other}'"),
            }),
        }
    }
}
