use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_FALLBACK_LANGUAGES, DEFAULT_LANGUAGE};

/// Input of the YouTube summary pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeRequest {
    pub url: String,
    pub video_id: String,
    pub language: String,
    /// Transcript languages tried, in order, when none exists in `language`.
    #[serde(default)]
    pub fallback_languages: Vec<String>,
}

impl SummarizeRequest {
    pub fn new(url: impl Into<String>, video_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            video_id: video_id.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            fallback_languages: DEFAULT_FALLBACK_LANGUAGES
                .iter()
                .map(|lang| lang.to_string())
                .collect(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_fallback_languages(mut self, languages: Vec<String>) -> Self {
        self.fallback_languages = languages;
        self
    }

    pub fn transcript_query(&self) -> TranscriptQuery {
        self.query_for(&self.language)
    }

    /// One query per transcript language, preferred language first, without repeats.
    pub fn transcript_queries(&self) -> Vec<TranscriptQuery> {
        let mut languages: Vec<&str> = Vec::new();
        for language in std::iter::once(&self.language).chain(&self.fallback_languages) {
            let language = language.trim();
            if !language.is_empty() && !languages.contains(&language) {
                languages.push(language);
            }
        }
        languages.into_iter().map(|lang| self.query_for(lang)).collect()
    }

    fn query_for(&self, language: &str) -> TranscriptQuery {
        TranscriptQuery {
            url: self.url.clone(),
            video_id: self.video_id.clone(),
            language: language.to_string(),
        }
    }
}

/// What a transcript provider is asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptQuery {
    pub url: String,
    pub video_id: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub text: String,
    /// Offset from the start of the video, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub video_id: String,
    pub video_url: String,
    pub language: String,
    /// Which provider produced this transcript.
    pub provider: String,
    #[serde(default)]
    pub entries: Vec<TranscriptEntry>,
    /// Full text as one string.
    pub merged: String,
}

impl Transcript {
    pub fn char_count(&self) -> usize {
        self.merged.chars().count()
    }

    pub fn has_timestamps(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|e| e.start.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub video_id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub channel: Channel,
    pub published_at: String,
    /// ISO 8601 duration as reported by the API, e.g. `PT4M13S`.
    pub duration: String,
    pub statistics: Statistics,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_status: Option<String>,
}

/// Request sent to a text-generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPrompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    pub provider: String,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn languages(request: &SummarizeRequest) -> Vec<String> {
        request
            .transcript_queries()
            .into_iter()
            .map(|query| query.language)
            .collect()
    }

    #[test]
    fn preferred_language_comes_before_fallbacks() {
        let request = SummarizeRequest::new("https://youtu.be/abc", "abc");
        assert_eq!(languages(&request), vec!["ko", "en"]);
    }

    #[test]
    fn repeated_languages_are_queried_once() {
        let request = SummarizeRequest::new("https://youtu.be/abc", "abc")
            .with_language("en")
            .with_fallback_languages(vec!["en".into(), " ".into(), "ja".into()]);
        assert_eq!(languages(&request), vec!["en", "ja"]);
    }
}
