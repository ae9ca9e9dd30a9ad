//! The YouTube summary workflow: transcript, video info, summary, notify.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    clients::{
        ApifyActor, BitlyShortener, ChatClient, DEFAULT_TRANSCRIPT_ACTORS, DiscordChannel,
        YouTubeDataClient,
    },
    config::{Credentials, PipelineConfig},
    delivery::{DeliverySummary, SequentialDelivery},
    error::{Result, TubeDigestError},
    fallback::{FallbackProvider, FallbackSuccess, ProviderFailure, ProviderFallbackRunner},
    format::build_summary_prompt,
    pipeline::{Pipeline, PipelineContext, StageExecutor, StageResult},
    service::{CallService, JobService, MessageEndpoint},
    shorten::{ShortenedText, shorten_links},
    types::{SummarizeRequest, Summary, SummaryPrompt, Transcript, TranscriptQuery, VideoInfo},
};

pub const TRANSCRIPT_STAGE: &str = "transcript";
pub const VIDEO_INFO_STAGE: &str = "video_info";
pub const SUMMARY_STAGE: &str = "summary";
pub const SHORTEN_STAGE: &str = "shorten";
pub const NOTIFY_STAGE: &str = "notify";

/// Stages whose outputs are worth caching between runs.
pub const CACHEABLE_STAGES: &[&str] = &[TRANSCRIPT_STAGE, VIDEO_INFO_STAGE, SUMMARY_STAGE];

pub struct TranscriptStage {
    runner: ProviderFallbackRunner,
    providers: Vec<FallbackProvider<TranscriptQuery, Transcript>>,
}

impl TranscriptStage {
    pub fn new(
        runner: ProviderFallbackRunner,
        providers: Vec<FallbackProvider<TranscriptQuery, Transcript>>,
    ) -> Self {
        Self { runner, providers }
    }

    async fn transcript(
        &self,
        context: &PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<Transcript> {
        let request: SummarizeRequest = context.input()?;
        let success = extract_transcript(&self.runner, &self.providers, &request, cancel).await?;
        info!(
            provider = %success.provider,
            chars = success.data.char_count(),
            "Transcript extracted"
        );
        Ok(success.data)
    }
}

/// Run the transcript providers for each language of the request in turn.
///
/// The next language is tried only when every provider failed for the
/// current one. If all languages fail, the error lists every failure.
pub async fn extract_transcript(
    runner: &ProviderFallbackRunner,
    providers: &[FallbackProvider<TranscriptQuery, Transcript>],
    request: &SummarizeRequest,
    cancel: &CancellationToken,
) -> Result<FallbackSuccess<Transcript>> {
    let mut failures: Vec<ProviderFailure> = Vec::new();

    for query in request.transcript_queries() {
        match runner.run(providers, &query, cancel).await {
            Ok(success) => return Ok(success),
            Err(TubeDigestError::ProviderExhausted { failures: tried }) => {
                warn!(language = %query.language, "No transcript in this language");
                failures.extend(tried.into_iter().map(|failure| ProviderFailure {
                    provider: format!("{} [{}]", failure.provider, query.language),
                    ..failure
                }));
            }
            Err(err) => return Err(err),
        }
    }

    Err(TubeDigestError::ProviderExhausted { failures })
}

#[async_trait]
impl StageExecutor for TranscriptStage {
    async fn execute(&self, context: &PipelineContext, cancel: &CancellationToken) -> StageResult {
        StageResult::from_output(self.transcript(context, cancel).await)
    }
}

pub struct VideoInfoStage {
    service: Option<Arc<dyn CallService<String, VideoInfo>>>,
}

impl VideoInfoStage {
    /// `None` when no metadata service is configured; the stage then fails.
    pub fn new(service: Option<Arc<dyn CallService<String, VideoInfo>>>) -> Self {
        Self { service }
    }

    async fn video_info(&self, context: &PipelineContext) -> Result<VideoInfo> {
        let service = self
            .service
            .as_ref()
            .ok_or_else(|| TubeDigestError::MissingCredential {
                env_var: "YOUTUBE_API_KEY".to_string(),
            })?;
        let request: SummarizeRequest = context.input()?;

        service
            .call(&request.video_id)
            .await?
            .ok_or_else(|| TubeDigestError::InvalidResponse {
                reason: format!("video {} not found", request.video_id),
            })
    }
}

#[async_trait]
impl StageExecutor for VideoInfoStage {
    async fn execute(&self, context: &PipelineContext, cancel: &CancellationToken) -> StageResult {
        if cancel.is_cancelled() {
            return StageResult::from_output::<()>(Err(TubeDigestError::Cancelled));
        }
        StageResult::from_output(self.video_info(context).await)
    }
}

pub struct SummaryStage {
    runner: ProviderFallbackRunner,
    providers: Vec<FallbackProvider<SummaryPrompt, Summary>>,
    guide: Option<String>,
}

impl SummaryStage {
    pub fn new(
        runner: ProviderFallbackRunner,
        providers: Vec<FallbackProvider<SummaryPrompt, Summary>>,
        guide: Option<String>,
    ) -> Self {
        Self {
            runner,
            providers,
            guide,
        }
    }

    async fn summary(
        &self,
        context: &PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<Summary> {
        let request: SummarizeRequest = context.input()?;
        let transcript: Transcript = context.require(TRANSCRIPT_STAGE)?;
        let video_info: Option<VideoInfo> = context.get(VIDEO_INFO_STAGE)?;

        let prompt = build_summary_prompt(
            &transcript,
            video_info.as_ref(),
            &request.language,
            self.guide.as_deref(),
        );

        let success = self.runner.run(&self.providers, &prompt, cancel).await?;
        info!(
            provider = %success.provider,
            chars = success.data.text.chars().count(),
            "Summary generated"
        );
        Ok(success.data)
    }
}

#[async_trait]
impl StageExecutor for SummaryStage {
    async fn execute(&self, context: &PipelineContext, cancel: &CancellationToken) -> StageResult {
        StageResult::from_output(self.summary(context, cancel).await)
    }
}

pub struct ShortenStage {
    shortener: Option<Arc<dyn CallService<String, String>>>,
}

impl ShortenStage {
    /// `None` when no shortener is configured; the stage then fails.
    pub fn new(shortener: Option<Arc<dyn CallService<String, String>>>) -> Self {
        Self { shortener }
    }

    async fn shorten(
        &self,
        context: &PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<ShortenedText> {
        let shortener = self
            .shortener
            .as_ref()
            .ok_or_else(|| TubeDigestError::MissingCredential {
                env_var: "BITLY_TOKEN".to_string(),
            })?;
        let summary: Summary = context.require(SUMMARY_STAGE)?;

        let shortened = shorten_links(&summary.text, shortener.as_ref(), cancel).await?;
        info!(
            shortened = shortened.links.len(),
            kept = shortened.kept.len(),
            "Links shortened"
        );
        Ok(shortened)
    }
}

#[async_trait]
impl StageExecutor for ShortenStage {
    async fn execute(&self, context: &PipelineContext, cancel: &CancellationToken) -> StageResult {
        StageResult::from_output(self.shorten(context, cancel).await)
    }
}

pub struct NotifyStage {
    delivery: SequentialDelivery,
    endpoint: Option<Arc<dyn MessageEndpoint>>,
}

impl NotifyStage {
    pub fn new(delivery: SequentialDelivery, endpoint: Option<Arc<dyn MessageEndpoint>>) -> Self {
        Self { delivery, endpoint }
    }

    async fn notify(
        &self,
        context: &PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<DeliverySummary> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| TubeDigestError::MissingCredential {
                env_var: "DISCORD_BOT_TOKEN".to_string(),
            })?;
        let text = match context.get::<ShortenedText>(SHORTEN_STAGE)? {
            Some(shortened) => shortened.text,
            None => context.require::<Summary>(SUMMARY_STAGE)?.text,
        };

        self.delivery
            .deliver(&text, endpoint.as_ref(), cancel)
            .await
            .into_result()
    }
}

#[async_trait]
impl StageExecutor for NotifyStage {
    async fn execute(&self, context: &PipelineContext, cancel: &CancellationToken) -> StageResult {
        StageResult::from_output(self.notify(context, cancel).await)
    }
}

/// Remote services the summary pipeline is assembled from.
pub struct SummaryServices {
    pub transcript: Vec<FallbackProvider<TranscriptQuery, Transcript>>,
    pub video_info: Option<Arc<dyn CallService<String, VideoInfo>>>,
    pub summarizers: Vec<FallbackProvider<SummaryPrompt, Summary>>,
    pub endpoint: Option<Arc<dyn MessageEndpoint>>,
    pub shortener: Option<Arc<dyn CallService<String, String>>>,
}

impl SummaryServices {
    /// Real HTTP clients for every service the configuration enables.
    ///
    /// Missing Apify credentials are an error. Missing keys for optional
    /// services leave them unset so their stage fails and is skipped.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let credentials = &config.credentials;
        let token = Credentials::require(&credentials.apify_token, "APIFY")?;

        let transcript = DEFAULT_TRANSCRIPT_ACTORS
            .iter()
            .map(|actor| {
                let service = ApifyActor::new(*actor, token)
                    .with_wait_for_finish(config.poll.wait_for_finish);
                FallbackProvider::job(
                    *actor,
                    Arc::new(service) as Arc<dyn JobService<TranscriptQuery, Transcript>>,
                )
            })
            .collect();

        let video_info = match YouTubeDataClient::from_credentials(credentials) {
            Ok(client) => Some(Arc::new(client) as Arc<dyn CallService<String, VideoInfo>>),
            Err(err) => {
                if config.with_video_info {
                    warn!(error = %err, "Video info requested but unavailable");
                }
                None
            }
        };

        let summarizers = config
            .providers
            .iter()
            .filter_map(|provider| match ChatClient::from_credentials(*provider, credentials) {
                Ok(client) => Some(FallbackProvider::call(
                    provider.slug(),
                    Arc::new(client) as Arc<dyn CallService<SummaryPrompt, Summary>>,
                )),
                Err(err) => {
                    info!(provider = provider.name(), error = %err, "Leaving out summary provider");
                    None
                }
            })
            .collect::<Vec<_>>();
        if summarizers.is_empty() {
            warn!("No summary provider has an API key configured");
        }

        let endpoint = match DiscordChannel::from_credentials(credentials) {
            Ok(channel) => Some(Arc::new(channel) as Arc<dyn MessageEndpoint>),
            Err(err) => {
                if config.notify {
                    warn!(error = %err, "Discord notification requested but unavailable");
                }
                None
            }
        };

        let shortener = match BitlyShortener::from_credentials(credentials) {
            Ok(shortener) => Some(Arc::new(shortener) as Arc<dyn CallService<String, String>>),
            Err(err) => {
                if config.shorten_links {
                    warn!(error = %err, "Link shortening requested but unavailable");
                }
                None
            }
        };

        Ok(Self {
            transcript,
            video_info,
            summarizers,
            endpoint,
            shortener,
        })
    }
}

/// Assemble the summary pipeline. Video info, shorten and notify are only
/// added when the configuration enables them.
pub fn build_summary_pipeline(config: &PipelineConfig, services: SummaryServices) -> Result<Pipeline> {
    let runner = ProviderFallbackRunner::new(config.poll.clone());
    let delivery = SequentialDelivery::from_config(&config.delivery)?;

    let mut builder = Pipeline::builder().required(
        TRANSCRIPT_STAGE,
        Arc::new(TranscriptStage::new(runner.clone(), services.transcript)),
    );

    if config.with_video_info {
        builder = builder.optional(
            VIDEO_INFO_STAGE,
            Arc::new(VideoInfoStage::new(services.video_info)),
        );
    }

    builder = builder.required(
        SUMMARY_STAGE,
        Arc::new(SummaryStage::new(
            runner,
            services.summarizers,
            config.summary_guide.clone(),
        )),
    );

    if config.shorten_links {
        builder = builder.optional(
            SHORTEN_STAGE,
            Arc::new(ShortenStage::new(services.shortener)),
        );
    }

    if config.notify {
        builder = builder.optional(
            NOTIFY_STAGE,
            Arc::new(NotifyStage::new(delivery, services.endpoint)),
        );
    }

    builder.output_from(SUMMARY_STAGE).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apify_token_is_required() {
        let config = PipelineConfig::new(Credentials::default());
        let err = SummaryServices::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("APIFY"));
    }

    #[test]
    fn providers_without_keys_are_left_out() {
        let credentials = Credentials {
            apify_token: Some("apify".into()),
            openai_api_key: Some("sk".into()),
            ..Default::default()
        };
        let config = PipelineConfig::new(credentials);

        let services = SummaryServices::from_config(&config).unwrap();

        let names: Vec<&str> = services.summarizers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["openai"]);
        assert_eq!(services.transcript.len(), 2);
        assert!(services.endpoint.is_none());
    }

    #[test]
    fn disabled_stages_are_not_added() {
        let credentials = Credentials {
            apify_token: Some("apify".into()),
            ..Default::default()
        };
        let mut config = PipelineConfig::new(credentials);
        config.notify = false;

        let pipeline =
            build_summary_pipeline(&config, SummaryServices::from_config(&config).unwrap())
                .unwrap();

        let names: Vec<&str> = pipeline.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![TRANSCRIPT_STAGE, SUMMARY_STAGE]);
    }

    #[test]
    fn shorten_runs_between_summary_and_notify() {
        let credentials = Credentials {
            apify_token: Some("apify".into()),
            ..Default::default()
        };
        let mut config = PipelineConfig::new(credentials);
        config.shorten_links = true;

        let services = SummaryServices::from_config(&config).unwrap();
        assert!(services.shortener.is_none());
        let pipeline = build_summary_pipeline(&config, services).unwrap();

        let names: Vec<&str> = pipeline.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![TRANSCRIPT_STAGE, SUMMARY_STAGE, SHORTEN_STAGE, NOTIFY_STAGE]
        );
        assert!(!pipeline.stages()[2].required);
    }

    struct OnlyLanguage(&'static str);

    #[async_trait]
    impl CallService<TranscriptQuery, Transcript> for OnlyLanguage {
        async fn call(&self, query: &TranscriptQuery) -> Result<Option<Transcript>> {
            Ok((query.language == self.0).then(|| Transcript {
                video_id: query.video_id.clone(),
                video_url: query.url.clone(),
                language: query.language.clone(),
                provider: "captions".into(),
                entries: Vec::new(),
                merged: format!("{} captions", query.language),
            }))
        }
    }

    fn captions(language: &'static str) -> Vec<FallbackProvider<TranscriptQuery, Transcript>> {
        vec![FallbackProvider::call(
            "captions",
            Arc::new(OnlyLanguage(language)) as Arc<dyn CallService<TranscriptQuery, Transcript>>,
        )]
    }

    #[tokio::test]
    async fn falls_back_to_the_next_transcript_language() {
        let request = SummarizeRequest::new("https://youtu.be/abc", "abc")
            .with_language("ko")
            .with_fallback_languages(vec!["en".into()]);

        let success = extract_transcript(
            &ProviderFallbackRunner::default(),
            &captions("en"),
            &request,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(success.data.language, "en");
        assert_eq!(success.data.merged, "en captions");
    }

    #[tokio::test]
    async fn every_language_failing_lists_each_attempt() {
        let request = SummarizeRequest::new("https://youtu.be/abc", "abc")
            .with_language("ko")
            .with_fallback_languages(vec!["en".into()]);

        let err = extract_transcript(
            &ProviderFallbackRunner::default(),
            &captions("ja"),
            &request,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        let TubeDigestError::ProviderExhausted { failures } = err else {
            panic!("expected exhaustion, got {err:?}");
        };
        let providers: Vec<&str> = failures.iter().map(|f| f.provider.as_str()).collect();
        assert_eq!(providers, vec!["captions [ko]", "captions [en]"]);
    }
}
