use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{DEFAULT_HTTP_TIMEOUT, ensure_success, http_client, read_reply};
use crate::{
    error::{Result, TubeDigestError},
    job::{JobHandle, JobStatus},
    service::JobService,
    types::{Transcript, TranscriptEntry, TranscriptQuery},
};

pub const APIFY_API_BASE: &str = "https://api.apify.com/v2";

/// Transcript actors in fallback order.
pub const DEFAULT_TRANSCRIPT_ACTORS: &[&str] =
    &["streamers/youtube-scraper", "visita/youtube-scraper"];

const STREAMERS_ACTOR: &str = "streamers/youtube-scraper";

/// Dataset item fields that may hold transcript text, in lookup order.
const TEXT_FIELDS: &[&str] = &[
    "transcriptMerged",
    "captions",
    "text",
    "subtitle",
    "transcript",
    "content",
    "subtitles",
];

/// Runs one Apify actor as a transcript job.
#[derive(Clone)]
pub struct ApifyActor {
    http: reqwest::Client,
    base_url: String,
    actor: String,
    token: String,
    wait_for_finish: Duration,
}

impl ApifyActor {
    pub fn new(actor: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: http_client(DEFAULT_HTTP_TIMEOUT),
            base_url: APIFY_API_BASE.to_string(),
            actor: actor.into(),
            token: token.into(),
            wait_for_finish: Duration::ZERO,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Let the start request block up to `wait` for the run to finish.
    pub fn with_wait_for_finish(mut self, wait: Duration) -> Self {
        self.wait_for_finish = wait;
        self
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json(&self, url: String) -> Result<Value> {
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let (status, body) = read_reply(response).await?;
        ensure_success(status, &body)?;
        Ok(body)
    }
}

impl std::fmt::Debug for ApifyActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApifyActor")
            .field("actor", &self.actor)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

pub fn parse_run_status(status: &str) -> Result<JobStatus> {
    match status {
        "READY" => Ok(JobStatus::Submitted),
        "RUNNING" => Ok(JobStatus::Running),
        "SUCCEEDED" => Ok(JobStatus::Succeeded),
        "FAILED" => Ok(JobStatus::Failed),
        "ABORTING" | "ABORTED" => Ok(JobStatus::Aborted),
        "TIMING-OUT" | "TIMED-OUT" => Ok(JobStatus::TimedOut),
        other => Err(TubeDigestError::InvalidResponse {
            reason: format!("unknown run status '{other}'"),
        }),
    }
}

/// Actor input for a transcript query; each actor expects its own shape.
pub fn actor_input(actor: &str, query: &TranscriptQuery) -> Value {
    if actor == STREAMERS_ACTOR {
        json!({
            "startUrls": [{ "url": query.url }],
            "maxResults": 1,
            "subtitlesLanguage": query.language,
            "captions": true,
        })
    } else {
        json!({
            "videoIds": [query.video_id],
            "language": query.language,
        })
    }
}

fn handle_from_run(body: &Value) -> Result<JobHandle> {
    let data = &body["data"];
    let id = data["id"]
        .as_str()
        .ok_or_else(|| TubeDigestError::InvalidResponse {
            reason: "actor run without an id".to_string(),
        })?;

    let mut handle = JobHandle::new(id);
    if let Some(status) = data["status"].as_str() {
        handle = handle.with_status(parse_run_status(status)?);
    }
    if let Some(dataset) = data["defaultDatasetId"].as_str() {
        handle = handle.with_result_location(dataset);
    }
    Ok(handle)
}

fn as_seconds(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn entry_from_value(value: &Value) -> Option<TranscriptEntry> {
    match value {
        Value::String(text) => Some(TranscriptEntry {
            text: text.clone(),
            start: None,
            duration: None,
        }),
        Value::Object(fields) => {
            let text = ["text", "content", "caption"]
                .iter()
                .find_map(|key| fields.get(*key).and_then(Value::as_str))?;
            let start = ["start", "offset", "startTime"]
                .iter()
                .find_map(|key| fields.get(*key).and_then(as_seconds));
            let duration = ["duration", "dur"]
                .iter()
                .find_map(|key| fields.get(*key).and_then(as_seconds));
            Some(TranscriptEntry {
                text: text.to_string(),
                start,
                duration,
            })
        }
        _ => None,
    }
}

/// Build a transcript from dataset items, using the first text field found.
///
/// Returns `None` when no item carries any non-empty text.
pub fn transcript_from_items(
    items: &[Value],
    query: &TranscriptQuery,
    provider: &str,
) -> Option<Transcript> {
    for item in items {
        let Some(fields) = item.as_object() else {
            continue;
        };

        for field in TEXT_FIELDS {
            let (entries, merged) = match fields.get(*field) {
                Some(Value::String(text)) => (Vec::new(), text.trim().to_string()),
                Some(Value::Array(values)) => {
                    let entries: Vec<TranscriptEntry> =
                        values.iter().filter_map(entry_from_value).collect();
                    let merged = entries
                        .iter()
                        .map(|entry| entry.text.trim())
                        .filter(|text| !text.is_empty())
                        .collect::<Vec<_>>()
                        .join(" ");
                    (entries, merged)
                }
                _ => continue,
            };

            if merged.is_empty() {
                continue;
            }

            let language = ["language", "languageCode"]
                .iter()
                .find_map(|key| fields.get(*key).and_then(Value::as_str))
                .unwrap_or(query.language.as_str());

            debug!(provider, field, chars = merged.len(), "Transcript text found");
            return Some(Transcript {
                video_id: query.video_id.clone(),
                video_url: query.url.clone(),
                language: language.to_string(),
                provider: provider.to_string(),
                entries,
                merged,
            });
        }
    }
    None
}

#[async_trait]
impl JobService<TranscriptQuery, Transcript> for ApifyActor {
    async fn submit(&self, query: &TranscriptQuery) -> Result<JobHandle> {
        let url = self.url(&format!("acts/{}/runs", self.actor.replace('/', "~")));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .timeout(self.wait_for_finish + DEFAULT_HTTP_TIMEOUT)
            .query(&[("waitForFinish", self.wait_for_finish.as_secs())])
            .json(&actor_input(&self.actor, query))
            .send()
            .await?;

        let (status, body) = read_reply(response).await?;
        ensure_success(status, &body)?;
        handle_from_run(&body)
    }

    async fn poll(&self, job: &JobHandle) -> Result<JobStatus> {
        let body = self.get_json(self.url(&format!("actor-runs/{}", job.id))).await?;
        let status = body["data"]["status"]
            .as_str()
            .ok_or_else(|| TubeDigestError::InvalidResponse {
                reason: "actor run without a status".to_string(),
            })?;
        parse_run_status(status)
    }

    async fn fetch(&self, query: &TranscriptQuery, job: &JobHandle) -> Result<Option<Transcript>> {
        let dataset = job
            .result_location
            .as_deref()
            .ok_or_else(|| TubeDigestError::InvalidResponse {
                reason: format!("run {} has no dataset", job.id),
            })?;

        let body = self.get_json(self.url(&format!("datasets/{dataset}/items"))).await?;
        let items: Vec<Value> = serde_json::from_value(body)?;
        Ok(transcript_from_items(&items, query, &self.actor))
    }
}
