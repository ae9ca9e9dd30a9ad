//! Replacing the links in a text with short links.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::{Result, TubeDigestError},
    service::CallService,
};

const SCHEMES: &[&str] = &["https://", "http://"];

/// Trailing characters that end a sentence rather than a URL.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];

fn ends_url(c: char) -> bool {
    c.is_whitespace() || matches!(c, '<' | '>' | '"' | '\'')
}

/// Byte ranges of every `http://` or `https://` URL in `text`, in order.
pub fn find_urls(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut offset = 0;

    while let Some(start) = next_scheme(&text[offset..]).map(|at| offset + at) {
        let rest = &text[start..];
        let mut end = start + rest.find(ends_url).unwrap_or(rest.len());

        let mut url = &text[start..end];
        loop {
            let trimmed = url.trim_end_matches(TRAILING_PUNCTUATION);
            let trimmed = if trimmed.ends_with(')') && !trimmed.contains('(') {
                &trimmed[..trimmed.len() - 1]
            } else {
                trimmed
            };
            if trimmed.len() == url.len() {
                break;
            }
            url = trimmed;
        }
        end = start + url.len();

        if SCHEMES
            .iter()
            .any(|scheme| url.starts_with(scheme) && url.len() > scheme.len())
        {
            spans.push((start, end));
        }
        offset = end.max(start + 1);
    }

    spans
}

fn next_scheme(text: &str) -> Option<usize> {
    SCHEMES.iter().filter_map(|scheme| text.find(scheme)).min()
}

/// A text whose links were shortened, and which ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortenedText {
    pub text: String,
    /// Original URL to short link.
    pub links: BTreeMap<String, String>,
    /// URLs left as they were because shortening failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kept: Vec<String>,
}

/// Shorten every distinct URL in `text` once. A URL the service cannot
/// shorten stays in the text unchanged; only cancellation is an error.
pub async fn shorten_links(
    text: &str,
    shortener: &dyn CallService<String, String>,
    cancel: &CancellationToken,
) -> Result<ShortenedText> {
    let spans = find_urls(text);
    let mut links = BTreeMap::new();
    let mut kept = Vec::new();

    for &(start, end) in &spans {
        let url = &text[start..end];
        if links.contains_key(url) || kept.iter().any(|k| k == url) {
            continue;
        }

        let url_owned = url.to_string();
        let shortened = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(TubeDigestError::Cancelled),
            shortened = shortener.call(&url_owned) => shortened,
        };

        match shortened {
            Ok(Some(short)) => {
                debug!(url, short = %short, "Link shortened");
                links.insert(url.to_string(), short);
            }
            Ok(None) => {
                warn!(url, "Shortener returned no link, keeping original");
                kept.push(url.to_string());
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                warn!(url, error = %err, "Failed to shorten link, keeping original");
                kept.push(url.to_string());
            }
        }
    }

    let mut shortened = String::with_capacity(text.len());
    let mut last = 0;
    for &(start, end) in &spans {
        shortened.push_str(&text[last..start]);
        let url = &text[start..end];
        shortened.push_str(links.get(url).map_or(url, String::as_str));
        last = end;
    }
    shortened.push_str(&text[last..]);

    Ok(ShortenedText {
        text: shortened,
        links,
        kept,
    })
}
