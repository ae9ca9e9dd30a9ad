use async_trait::async_trait;
use serde_json::Value;

use super::{DEFAULT_HTTP_TIMEOUT, ensure_success, http_client, read_reply};
use crate::{
    config::Credentials,
    error::{Result, TubeDigestError},
    service::CallService,
    types::{Channel, Statistics, VideoInfo},
};

pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

const URL_MARKERS: &[&str] = &[
    "watch?v=", "&v=", "?v=", "youtu.be/", "/embed/", "/v/", "/shorts/", "/live/",
];

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Extract the video id from a YouTube URL, or accept a bare 11-character id.
pub fn extract_video_id(url_or_id: &str) -> Result<String> {
    let input = url_or_id.trim();

    if input.chars().count() == 11 && input.chars().all(is_id_char) {
        return Ok(input.to_string());
    }

    for marker in URL_MARKERS {
        if let Some(pos) = input.find(marker) {
            let id: String = input[pos + marker.len()..]
                .chars()
                .take_while(|c| is_id_char(*c))
                .collect();
            if !id.is_empty() {
                return Ok(id);
            }
        }
    }

    Err(TubeDigestError::InvalidInput {
        reason: format!("could not extract a video id from '{input}'"),
    })
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

fn text(value: &Value, default: &str) -> String {
    value.as_str().unwrap_or(default).to_string()
}

// The API reports counts as decimal strings.
fn count(value: &Value) -> u64 {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}

/// Map a `videos.list` response onto [`VideoInfo`]; `None` when it has no items.
pub fn video_info_from_response(video_id: &str, body: &Value) -> Option<VideoInfo> {
    let video = body["items"].as_array()?.first()?;
    let snippet = &video["snippet"];
    let statistics = &video["statistics"];

    Some(VideoInfo {
        video_id: video_id.to_string(),
        url: watch_url(video_id),
        title: text(&snippet["title"], "N/A"),
        description: text(&snippet["description"], ""),
        channel: Channel {
            name: text(&snippet["channelTitle"], "N/A"),
            id: text(&snippet["channelId"], "N/A"),
        },
        published_at: text(&snippet["publishedAt"], "N/A"),
        duration: text(&video["contentDetails"]["duration"], "N/A"),
        statistics: Statistics {
            view_count: count(&statistics["viewCount"]),
            like_count: count(&statistics["likeCount"]),
            comment_count: count(&statistics["commentCount"]),
        },
        tags: snippet["tags"]
            .as_array()
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        category_id: snippet["categoryId"].as_str().map(str::to_string),
        privacy_status: video["status"]["privacyStatus"].as_str().map(str::to_string),
    })
}

/// YouTube Data API v3 video metadata lookups.
#[derive(Clone)]
pub struct YouTubeDataClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl YouTubeDataClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: http_client(DEFAULT_HTTP_TIMEOUT),
            base_url: YOUTUBE_API_BASE.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        let key = Credentials::require(&credentials.youtube_api_key, "YOUTUBE_API_KEY")?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl std::fmt::Debug for YouTubeDataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YouTubeDataClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CallService<String, VideoInfo> for YouTubeDataClient {
    async fn call(&self, video_id: &String) -> Result<Option<VideoInfo>> {
        let response = self
            .http
            .get(format!("{}/videos", self.base_url.trim_end_matches('/')))
            .query(&[
                ("part", "snippet,statistics,contentDetails,status"),
                ("id", video_id.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let (status, body) = read_reply(response).await?;
        ensure_success(status, &body)?;
        Ok(video_info_from_response(video_id, &body))
    }
}
