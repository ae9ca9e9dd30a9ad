use crate::types::{SummaryPrompt, Transcript, VideoInfo};

/// System prompt used when no summary guide file is supplied.
pub const DEFAULT_SUMMARY_GUIDE: &str = "\
You summarize YouTube videos from their transcripts.

Write a structured Markdown summary with these sections:

# <video title or a short descriptive title>

## One-line summary
A single sentence capturing the main point.

## Key points
3 to 7 bullet points, most important first.

## Detailed summary
Group the content by topic in the order it appears. Keep concrete numbers,
names, examples and recommendations. Use timestamps like [MM:SS] when the
transcript provides them.

## Takeaways
What a viewer should remember or do after watching.

Do not invent content that is not in the transcript. Prefer short paragraphs
separated by blank lines.";

const DESCRIPTION_PROMPT_LIMIT: usize = 500;
const DESCRIPTION_DISPLAY_LIMIT: usize = 300;

/// Format seconds as MM:SS timestamp
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let mins = (seconds / 60.0) as u32;
    let secs = (seconds % 60.0) as u32;
    format!("{:02}:{:02}", mins, secs)
}

/// 1234567 -> "1,234,567"
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn truncate_chars(text: &str, limit: usize) -> (&str, bool) {
    match text.char_indices().nth(limit) {
        Some((byte, _)) => (&text[..byte], true),
        None => (text, false),
    }
}

/// Format transcript entries with timestamps
pub fn format_transcript_with_timestamps(transcript: &Transcript) -> String {
    transcript
        .entries
        .iter()
        .map(|entry| match entry.start {
            Some(start) => format!("[{}] {}", format_timestamp(start), entry.text.trim()),
            None => entry.text.trim().to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_transcript_for_prompt(transcript: &Transcript) -> String {
    let mut output = String::new();
    output.push_str(&format!("Video ID: {}\n", transcript.video_id));
    output.push_str(&format!("Video URL: {}\n\n", transcript.video_url));

    if !transcript.merged.trim().is_empty() {
        output.push_str("=== Full transcript ===\n");
        output.push_str(&transcript.merged);
    } else {
        output.push_str("=== Timestamped transcript ===\n");
        output.push_str(&format_transcript_with_timestamps(transcript));
    }
    output
}

pub fn format_video_info_for_prompt(info: &VideoInfo) -> String {
    let (description, _) = truncate_chars(&info.description, DESCRIPTION_PROMPT_LIMIT);

    let mut output = String::new();
    output.push_str("=== Video information ===\n");
    output.push_str(&format!("Title: {}\n", info.title));
    output.push_str(&format!("Description: {}...\n", description));
    output.push_str(&format!("Channel: {}\n", info.channel.name));
    output.push_str(&format!("Duration: {}\n", info.duration));
    output.push_str(&format!(
        "Views: {}\n",
        format_count(info.statistics.view_count)
    ));
    output.push_str(&format!(
        "Likes: {}\n",
        format_count(info.statistics.like_count)
    ));
    output
}

/// Assemble the summary request from the transcript and optional video info.
pub fn build_summary_prompt(
    transcript: &Transcript,
    video_info: Option<&VideoInfo>,
    language: &str,
    guide: Option<&str>,
) -> SummaryPrompt {
    let mut parts = Vec::new();
    if let Some(info) = video_info {
        parts.push(format_video_info_for_prompt(info));
    }
    parts.push(format_transcript_for_prompt(transcript));
    parts.push(format!(
        "\nWrite a structured summary of the video above following the guide. \
         Write the summary in language '{language}'."
    ));

    SummaryPrompt {
        system: guide.unwrap_or(DEFAULT_SUMMARY_GUIDE).to_string(),
        user: parts.join("\n"),
    }
}

pub fn format_video_info_readable(info: &VideoInfo) -> String {
    let mut output = String::new();
    output.push_str(&format!("Title: {}\n", info.title));
    output.push_str(&format!("Channel: {}\n", info.channel.name));
    output.push_str(&format!("Video URL: {}\n", info.url));
    output.push_str(&format!("Published: {}\n", info.published_at));
    output.push_str(&format!("Duration: {}\n", info.duration));
    output.push_str("\nStatistics:\n");
    output.push_str(&format!(
        "  Views: {}\n",
        format_count(info.statistics.view_count)
    ));
    output.push_str(&format!(
        "  Likes: {}\n",
        format_count(info.statistics.like_count)
    ));
    output.push_str(&format!(
        "  Comments: {}\n",
        format_count(info.statistics.comment_count)
    ));

    if !info.tags.is_empty() {
        let tags: Vec<&str> = info.tags.iter().take(10).map(String::as_str).collect();
        output.push_str(&format!("\nTags: {}\n", tags.join(", ")));
    }

    output.push_str("\nDescription:\n");
    let (description, truncated) = truncate_chars(&info.description, DESCRIPTION_DISPLAY_LIMIT);
    output.push_str(description);
    if truncated {
        output.push_str("...");
    }
    output.push('\n');
    output
}

pub fn format_transcript_readable(transcript: &Transcript) -> String {
    let mut output = String::new();
    output.push_str(&format!("Video ID: {}\n", transcript.video_id));
    output.push_str(&format!("Video URL: {}\n", transcript.video_url));
    output.push_str(&format!("Provider: {}\n", transcript.provider));
    output.push_str(&format!("Language: {}\n", transcript.language));
    output.push_str(&format!("Characters: {}\n\n", transcript.char_count()));

    if transcript.has_timestamps() {
        output.push_str(&format_transcript_with_timestamps(transcript));
    } else {
        output.push_str(&transcript.merged);
    }
    output.push('\n');
    output
}
