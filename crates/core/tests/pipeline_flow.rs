use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tubedigest_core::{
    CallService, Channel, Credentials, EndpointReply, ErrorKind, FallbackProvider, JobHandle,
    JobService, JobStatus, MessageEndpoint, NOTIFY_STAGE, PipelineConfig, PipelineContext,
    Result, RunOutcome, SHORTEN_STAGE, SUMMARY_STAGE, Statistics, StageResult, SummarizeRequest,
    Summary,
    SummaryPrompt, SummaryServices, TRANSCRIPT_STAGE, Transcript, TranscriptQuery,
    TubeDigestError, VIDEO_INFO_STAGE, VideoInfo, build_summary_pipeline,
};

const VIDEO_ID: &str = "dQw4w9WgXcQ";

/// Transcript job that walks through scripted statuses.
struct FakeActor {
    name: &'static str,
    statuses: Mutex<VecDeque<JobStatus>>,
    text: Option<&'static str>,
    submits: AtomicUsize,
}

impl FakeActor {
    fn new(name: &'static str, statuses: Vec<JobStatus>, text: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            name,
            statuses: Mutex::new(statuses.into()),
            text,
            submits: AtomicUsize::new(0),
        })
    }

    fn provider(self: &Arc<Self>) -> FallbackProvider<TranscriptQuery, Transcript> {
        FallbackProvider::job(
            self.name,
            Arc::clone(self) as Arc<dyn JobService<TranscriptQuery, Transcript>>,
        )
    }
}

#[async_trait]
impl JobService<TranscriptQuery, Transcript> for FakeActor {
    async fn submit(&self, _query: &TranscriptQuery) -> Result<JobHandle> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        Ok(JobHandle::new(format!("{}-run", self.name)).with_result_location("dataset"))
    }

    async fn poll(&self, _job: &JobHandle) -> Result<JobStatus> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(JobStatus::Running))
    }

    async fn fetch(&self, query: &TranscriptQuery, _job: &JobHandle) -> Result<Option<Transcript>> {
        Ok(self.text.map(|text| Transcript {
            video_id: query.video_id.clone(),
            video_url: query.url.clone(),
            language: query.language.clone(),
            provider: self.name.to_string(),
            entries: Vec::new(),
            merged: text.to_string(),
        }))
    }
}

/// Summarizer answering from a fixed script and remembering its prompts.
struct FakeSummarizer {
    name: &'static str,
    answer: fn() -> Result<Option<String>>,
    prompts: Mutex<Vec<SummaryPrompt>>,
}

impl FakeSummarizer {
    fn new(name: &'static str, answer: fn() -> Result<Option<String>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            answer,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn provider(self: &Arc<Self>) -> FallbackProvider<SummaryPrompt, Summary> {
        FallbackProvider::call(
            self.name,
            Arc::clone(self) as Arc<dyn CallService<SummaryPrompt, Summary>>,
        )
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl CallService<SummaryPrompt, Summary> for FakeSummarizer {
    async fn call(&self, prompt: &SummaryPrompt) -> Result<Option<Summary>> {
        self.prompts.lock().unwrap().push(prompt.clone());
        Ok((self.answer)()?.map(|text| Summary {
            text,
            provider: self.name.to_string(),
            model: "fake-model".to_string(),
        }))
    }
}

struct FakeVideoInfo;

#[async_trait]
impl CallService<String, VideoInfo> for FakeVideoInfo {
    async fn call(&self, video_id: &String) -> Result<Option<VideoInfo>> {
        Ok(Some(VideoInfo {
            video_id: video_id.clone(),
            url: format!("https://www.youtube.com/watch?v={video_id}"),
            title: "Never Gonna Give You Up".into(),
            description: "Official video".into(),
            channel: Channel {
                name: "Rick Astley".into(),
                id: "UC1".into(),
            },
            published_at: "2009-10-25T06:57:33Z".into(),
            duration: "PT3M33S".into(),
            statistics: Statistics::default(),
            tags: Vec::new(),
            category_id: None,
            privacy_status: None,
        }))
    }
}

/// Message endpoint replaying scripted replies, 200 once the script runs out.
struct FakeChannel {
    replies: Mutex<VecDeque<EndpointReply>>,
    sent: Mutex<Vec<String>>,
}

impl FakeChannel {
    fn new(replies: Vec<EndpointReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageEndpoint for FakeChannel {
    fn name(&self) -> &str {
        "fake-discord"
    }

    async fn post(&self, content: &str) -> Result<EndpointReply> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(content.to_string());
        let id = sent.len().to_string();
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| EndpointReply::ok(json!({ "id": id }))))
    }
}

/// Shortener numbering links in the order it sees them.
struct FakeShortener {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl CallService<String, String> for FakeShortener {
    async fn call(&self, url: &String) -> Result<Option<String>> {
        let mut seen = self.seen.lock().unwrap();
        seen.push(url.clone());
        Ok(Some(format!("https://bit.ly/{}", seen.len())))
    }
}

fn linked_summary() -> Result<Option<String>> {
    Ok(Some(
        "Sources: https://example.com/very/long/article?ref=video and https://example.com/other"
            .to_string(),
    ))
}

fn long_summary() -> Result<Option<String>> {
    Ok(Some(format!(
        "# Summary\n\n{}\n\n{}",
        "a".repeat(50),
        "b".repeat(50)
    )))
}

fn nothing() -> Result<Option<String>> {
    Ok(None)
}

fn broken() -> Result<Option<String>> {
    Err(TubeDigestError::RemoteRejected {
        status: 529,
        body: "overloaded".into(),
    })
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::new(Credentials::default());
    config.delivery.max_chunk_size = 60;
    config.delivery.default_retry_delay = Duration::from_secs(1);
    config
}

fn request() -> PipelineContext {
    let request = SummarizeRequest::new(format!("https://youtu.be/{VIDEO_ID}"), VIDEO_ID)
        .with_language("en");
    PipelineContext::from_input(&request).unwrap()
}

#[tokio::test(start_paused = true)]
async fn falls_back_through_every_stage_and_delivers_in_order() {
    let failing_actor = FakeActor::new("primary", vec![JobStatus::Running, JobStatus::Failed], None);
    let backup_actor = FakeActor::new(
        "backup",
        vec![JobStatus::Running, JobStatus::Succeeded],
        Some("never gonna give you up"),
    );
    let empty = FakeSummarizer::new("empty", nothing);
    let good = FakeSummarizer::new("good", long_summary);
    let channel = FakeChannel::new(Vec::new());

    let services = SummaryServices {
        transcript: vec![failing_actor.provider(), backup_actor.provider()],
        video_info: None,
        summarizers: vec![empty.provider(), good.provider()],
        endpoint: Some(channel.clone()),
        shortener: None,
    };
    let pipeline = build_summary_pipeline(&config(), services).unwrap();

    let run = pipeline
        .run_with_context(request(), &CancellationToken::new())
        .await;

    assert_eq!(run.outcome, RunOutcome::Success, "{:?}", run.failure);
    assert_eq!(run.exit_code(), 0);

    let transcript: Transcript = run.context.require(TRANSCRIPT_STAGE).unwrap();
    assert_eq!(transcript.provider, "backup");
    assert_eq!(transcript.video_id, VIDEO_ID);

    let summary: Summary = run.output_as().unwrap().unwrap();
    assert_eq!(summary.provider, "good");
    assert_eq!(empty.calls(), 1);
    assert!(good.prompts.lock().unwrap()[0].user.contains("never gonna give you up"));

    let sent = channel.sent();
    assert_eq!(sent, vec!["# Summary".to_string(), "a".repeat(50), "b".repeat(50)]);
    let notify = run.context.value(NOTIFY_STAGE).unwrap();
    assert_eq!(notify["chunks_sent"], 3);
    assert_eq!(notify["message_ids"], json!(["1", "2", "3"]));
}

#[tokio::test(start_paused = true)]
async fn exhausted_summary_providers_halt_before_notify() {
    let actor = FakeActor::new("actor", vec![JobStatus::Succeeded], Some("transcript"));
    let first = FakeSummarizer::new("first", broken);
    let second = FakeSummarizer::new("second", broken);
    let channel = FakeChannel::new(Vec::new());

    let services = SummaryServices {
        transcript: vec![actor.provider()],
        video_info: None,
        summarizers: vec![first.provider(), second.provider()],
        endpoint: Some(channel.clone()),
        shortener: None,
    };
    let pipeline = build_summary_pipeline(&config(), services).unwrap();

    let run = pipeline
        .run_with_context(request(), &CancellationToken::new())
        .await;

    assert_eq!(run.outcome, RunOutcome::Failed);
    assert_eq!(run.exit_code(), 1);
    let failure = run.failure.clone().unwrap();
    assert_eq!(failure.stage, SUMMARY_STAGE);
    assert_eq!(failure.kind, ErrorKind::ProviderExhausted);
    assert!(failure.message.contains("first"));
    assert!(failure.message.contains("second"));

    assert!(run.stage(TRANSCRIPT_STAGE).unwrap().result.is_ok());
    assert!(run.stage(NOTIFY_STAGE).is_none());
    assert!(channel.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rate_limited_notification_leaves_a_partial_run() {
    let actor = FakeActor::new("actor", vec![JobStatus::Succeeded], Some("transcript"));
    let summarizer = FakeSummarizer::new("good", long_summary);
    let channel = FakeChannel::new(vec![
        EndpointReply::ok(json!({"id": "1"})),
        EndpointReply::rate_limited(None),
        EndpointReply::rate_limited(None),
        EndpointReply::rate_limited(None),
    ]);

    let services = SummaryServices {
        transcript: vec![actor.provider()],
        video_info: None,
        summarizers: vec![summarizer.provider()],
        endpoint: Some(channel.clone()),
        shortener: None,
    };
    let pipeline = build_summary_pipeline(&config(), services).unwrap();

    let run = pipeline
        .run_with_context(request(), &CancellationToken::new())
        .await;

    assert_eq!(run.outcome, RunOutcome::Partial);
    assert_eq!(run.exit_code(), 0);
    assert!(run.output.is_some());

    let notify = run.stage(NOTIFY_STAGE).unwrap();
    assert!(matches!(notify.result, StageResult::Skipped { .. }));
    let error = notify.error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::RateLimitExhausted);
    assert!(error.message.contains("Chunk 2 failed after 1"));
    assert_eq!(channel.sent().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn resumed_run_reuses_the_cached_transcript() {
    let actor = FakeActor::new("actor", vec![JobStatus::Succeeded], Some("fresh"));
    let summarizer = FakeSummarizer::new("good", long_summary);
    let mut config = config();
    config.notify = false;

    let services = SummaryServices {
        transcript: vec![actor.provider()],
        video_info: None,
        summarizers: vec![summarizer.provider()],
        endpoint: None,
        shortener: None,
    };
    let pipeline = build_summary_pipeline(&config, services).unwrap();

    let cached = json!({
        "video_id": VIDEO_ID,
        "video_url": "https://youtu.be/dQw4w9WgXcQ",
        "language": "en",
        "provider": "earlier-run",
        "entries": [],
        "merged": "cached transcript"
    });
    let context = request().with_value(TRANSCRIPT_STAGE, cached);

    let run = pipeline
        .run_with_context(context, &CancellationToken::new())
        .await;

    assert_eq!(run.outcome, RunOutcome::Success);
    assert_eq!(actor.submits.load(Ordering::SeqCst), 0);
    assert!(run.stage(TRANSCRIPT_STAGE).unwrap().reused);
    assert!(summarizer.prompts.lock().unwrap()[0].user.contains("cached transcript"));
}

#[tokio::test(start_paused = true)]
async fn video_info_is_part_of_the_prompt_when_requested() {
    let actor = FakeActor::new("actor", vec![JobStatus::Succeeded], Some("transcript"));
    let summarizer = FakeSummarizer::new("good", long_summary);
    let mut config = config();
    config.with_video_info = true;
    config.notify = false;

    let services = SummaryServices {
        transcript: vec![actor.provider()],
        video_info: Some(Arc::new(FakeVideoInfo)),
        summarizers: vec![summarizer.provider()],
        endpoint: None,
        shortener: None,
    };
    let pipeline = build_summary_pipeline(&config, services).unwrap();

    let run = pipeline
        .run_with_context(request(), &CancellationToken::new())
        .await;

    assert_eq!(run.outcome, RunOutcome::Success);
    assert!(run.context.contains(VIDEO_INFO_STAGE));
    let prompt = summarizer.prompts.lock().unwrap()[0].user.clone();
    assert!(prompt.contains("Title: Never Gonna Give You Up"));
    assert!(prompt.contains("Channel: Rick Astley"));
}

#[tokio::test(start_paused = true)]
async fn missing_video_info_service_only_skips_that_stage() {
    let actor = FakeActor::new("actor", vec![JobStatus::Succeeded], Some("transcript"));
    let summarizer = FakeSummarizer::new("good", long_summary);
    let mut config = config();
    config.with_video_info = true;
    config.notify = false;

    let services = SummaryServices {
        transcript: vec![actor.provider()],
        video_info: None,
        summarizers: vec![summarizer.provider()],
        endpoint: None,
        shortener: None,
    };
    let pipeline = build_summary_pipeline(&config, services).unwrap();

    let run = pipeline
        .run_with_context(request(), &CancellationToken::new())
        .await;

    assert_eq!(run.outcome, RunOutcome::Partial);
    let info = run.stage(VIDEO_INFO_STAGE).unwrap();
    assert_eq!(info.error.as_ref().unwrap().kind, ErrorKind::Configuration);
    assert_eq!(summarizer.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_while_polling_fails_the_transcript_stage() {
    let stuck = FakeActor::new("stuck", Vec::new(), None);
    let summarizer = FakeSummarizer::new("good", long_summary);

    let services = SummaryServices {
        transcript: vec![stuck.provider()],
        video_info: None,
        summarizers: vec![summarizer.provider()],
        endpoint: None,
        shortener: None,
    };
    let pipeline = build_summary_pipeline(&config(), services).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let run = pipeline.run_with_context(request(), &cancel).await;

    assert_eq!(run.outcome, RunOutcome::Failed);
    assert!(run.was_cancelled());
    assert_eq!(run.exit_code(), 130);
    assert_eq!(run.failure.unwrap().stage, TRANSCRIPT_STAGE);
    assert_eq!(summarizer.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn shortened_links_reach_discord_but_not_the_summary() {
    let actor = FakeActor::new("actor", vec![JobStatus::Succeeded], Some("transcript"));
    let summarizer = FakeSummarizer::new("good", linked_summary);
    let channel = FakeChannel::new(Vec::new());
    let shortener = Arc::new(FakeShortener {
        seen: Mutex::new(Vec::new()),
    });
    let mut config = config();
    config.delivery.max_chunk_size = 2000;
    config.shorten_links = true;

    let services = SummaryServices {
        transcript: vec![actor.provider()],
        video_info: None,
        summarizers: vec![summarizer.provider()],
        endpoint: Some(channel.clone()),
        shortener: Some(shortener.clone()),
    };
    let pipeline = build_summary_pipeline(&config, services).unwrap();

    let run = pipeline
        .run_with_context(request(), &CancellationToken::new())
        .await;

    assert_eq!(run.outcome, RunOutcome::Success, "{:?}", run.failure);
    assert_eq!(
        channel.sent(),
        vec!["Sources: https://bit.ly/1 and https://bit.ly/2".to_string()]
    );
    assert_eq!(shortener.seen.lock().unwrap().len(), 2);

    let summary: Summary = run.output_as().unwrap().unwrap();
    assert!(summary.text.contains("https://example.com/very/long/article?ref=video"));
    let shortened = run.context.value(SHORTEN_STAGE).unwrap();
    assert_eq!(
        shortened["links"]["https://example.com/other"],
        "https://bit.ly/2"
    );
}

#[tokio::test(start_paused = true)]
async fn missing_shortener_sends_the_original_summary() {
    let actor = FakeActor::new("actor", vec![JobStatus::Succeeded], Some("transcript"));
    let summarizer = FakeSummarizer::new("good", linked_summary);
    let channel = FakeChannel::new(Vec::new());
    let mut config = config();
    config.delivery.max_chunk_size = 2000;
    config.shorten_links = true;

    let services = SummaryServices {
        transcript: vec![actor.provider()],
        video_info: None,
        summarizers: vec![summarizer.provider()],
        endpoint: Some(channel.clone()),
        shortener: None,
    };
    let pipeline = build_summary_pipeline(&config, services).unwrap();

    let run = pipeline
        .run_with_context(request(), &CancellationToken::new())
        .await;

    assert_eq!(run.outcome, RunOutcome::Partial);
    let shorten = run.stage(SHORTEN_STAGE).unwrap();
    assert_eq!(shorten.error.as_ref().unwrap().kind, ErrorKind::Configuration);
    assert_eq!(channel.sent().len(), 1);
    assert!(channel.sent()[0].contains("https://example.com/other"));
}
