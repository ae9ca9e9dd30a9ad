pub mod cache;
pub mod chunk;
pub mod clients;
pub mod config;
pub mod delivery;
pub mod error;
pub mod fallback;
pub mod format;
pub mod job;
pub mod pipeline;
pub mod provider;
pub mod sender;
pub mod service;
pub mod shorten;
pub mod stages;
pub mod types;

mod suspend;

pub use cache::{ArtifactCache, get_root_cache_dir, get_stage_path, get_video_cache_dir};
pub use chunk::Chunk;
pub use clients::{
    ApifyActor, BitlyShortener, ChatClient, DiscordChannel, YouTubeDataClient, extract_video_id,
};
pub use config::{Credentials, DeliveryConfig, PipelineConfig, PollConfig};
pub use delivery::{DeliveryOutcome, DeliveryReport, DeliverySummary, SequentialDelivery};
pub use error::{ErrorKind, Result, TubeDigestError};
pub use fallback::{
    FallbackProvider, FallbackSuccess, ProviderAttemptResult, ProviderFailure,
    ProviderFallbackRunner,
};
pub use format::{
    build_summary_prompt, format_timestamp, format_transcript_readable, format_video_info_readable,
};
pub use job::{AsyncJob, JobHandle, JobStatus};
pub use pipeline::{
    Pipeline, PipelineBuilder, PipelineContext, PipelineObserver, PipelineRun, RunOutcome,
    StageDefinition, StageError, StageExecutor, StageRecord, StageResult,
};
pub use provider::{ApiFlavor, LlmProvider, ProviderConfig};
pub use sender::{AttemptOutcome, DeliveryAttempt, RateLimitedSender};
pub use service::{CallService, EndpointReply, JobService, MessageEndpoint};
pub use shorten::{ShortenedText, find_urls, shorten_links};
pub use stages::{
    NOTIFY_STAGE, SHORTEN_STAGE, SUMMARY_STAGE, SummaryServices, TRANSCRIPT_STAGE,
    VIDEO_INFO_STAGE, build_summary_pipeline, extract_transcript,
};
pub use types::{
    Channel, Statistics, SummarizeRequest, Summary, SummaryPrompt, Transcript, TranscriptEntry,
    TranscriptQuery, VideoInfo,
};
