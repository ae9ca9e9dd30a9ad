use std::{path::PathBuf, time::Instant};

use anyhow::{Context, Result};
use console::style;
use tokio::{fs, io::AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tubedigest_core::{
    ArtifactCache, BitlyShortener, CallService, Credentials, DeliveryConfig, DiscordChannel,
    ErrorKind, PipelineConfig, PipelineContext, ProviderFallbackRunner, SequentialDelivery,
    SummarizeRequest, Summary, SummaryServices, TubeDigestError, YouTubeDataClient,
    build_summary_pipeline, extract_transcript, extract_video_id, format_transcript_readable,
    format_video_info_readable, shorten_links, stages::CACHEABLE_STAGES,
};

use crate::{
    SendArgs, SummarizeArgs,
    render::{
        SpinnerObserver, create_spinner, format_duration, print_header, print_rule,
        print_run_footer,
    },
};

pub async fn summarize(args: SummarizeArgs, json: bool, cancel: &CancellationToken) -> Result<i32> {
    let total_start = Instant::now();
    let video_id = extract_video_id(&args.url)?;

    let mut config = PipelineConfig::new(Credentials::from_env());
    config.language = args.lang.clone();
    config.with_video_info = args.with_video_info;
    config.notify = !args.no_discord;
    config.shorten_links = args.shorten_links;
    if !args.provider.is_empty() {
        config.providers = args.provider.iter().copied().map(Into::into).collect();
    }
    if let Some(path) = &args.guide {
        let guide = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read guide {}", path.display()))?;
        config.summary_guide = Some(guide);
    }

    let services = SummaryServices::from_config(&config)?;
    let pipeline = build_summary_pipeline(&config, services)?;

    let request = SummarizeRequest::new(&args.url, &video_id)
        .with_language(&config.language)
        .with_fallback_languages(args.fallback_lang.clone());
    let mut context = PipelineContext::from_input(&request)?;
    let cache = ArtifactCache::for_request(&request);
    if !args.force {
        let seeded = cache.seed(&mut context, CACHEABLE_STAGES).await;
        if !seeded.is_empty() {
            info!(stages = ?seeded, cache = %cache.dir().display(), "Reusing cached stage outputs");
        }
    }

    if !json {
        print_header(&video_id);
    }

    let observer = SpinnerObserver::new(!json);
    let run = pipeline.run_observed(context, cancel, &observer).await;

    match cache.store_run(&run, CACHEABLE_STAGES).await {
        Ok(stored) if stored > 0 => info!(stored, "Cached stage outputs"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "Failed to cache stage outputs"),
    }

    let summary: Option<Summary> = run.output_as()?;
    let saved_to = match &summary {
        Some(summary) => Some(write_summary(&args, &video_id, summary).await?),
        None => None,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(run.exit_code());
    }

    print_run_footer(&run, total_start.elapsed());
    if let Some(path) = &saved_to {
        eprintln!("{} {}", style("Summary saved:").dim(), path.display());
    }
    if let Some(summary) = &summary
        && args.output.is_none()
    {
        print_rule();
        println!("{}", summary.text);
        print_rule();
    }

    Ok(run.exit_code())
}

async fn write_summary(args: &SummarizeArgs, video_id: &str, summary: &Summary) -> Result<PathBuf> {
    let path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("summary_{video_id}.md")));
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }
    fs::write(&path, &summary.text)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

async fn text_or_stdin(text: String) -> Result<String> {
    if text != "-" {
        return Ok(text);
    }
    let mut buf = String::new();
    tokio::io::stdin().read_to_string(&mut buf).await?;
    Ok(buf)
}

pub async fn send(args: SendArgs, json: bool, cancel: &CancellationToken) -> Result<i32> {
    let message = text_or_stdin(args.message).await?;

    let credentials = Credentials::from_env();
    let channel = match args.channel_id {
        Some(channel_id) => {
            let token = Credentials::require(&credentials.discord_bot_token, "DISCORD_BOT_TOKEN")?;
            DiscordChannel::new(token, channel_id)
        }
        None => DiscordChannel::from_credentials(&credentials)?,
    };

    let config = DeliveryConfig {
        max_chunk_size: args.max_chunk_size,
        ..Default::default()
    };
    let delivery = SequentialDelivery::from_config(&config)?;
    let chunk_count = delivery.plan(&message).len();

    let start = Instant::now();
    let spinner = (!json).then(|| {
        create_spinner(&format!(
            "Sending {} chunk(s) to channel {}...",
            chunk_count,
            channel.channel_id()
        ))
    });
    let summary = delivery.deliver(&message, &channel, cancel).await.summary();

    if let Some(spinner) = spinner {
        if summary.success {
            spinner.finish_with_message(format!(
                "{} Sent {} chunk(s) {}",
                style("✓").green().bold(),
                summary.chunks_sent,
                style(format!("[{}]", format_duration(start.elapsed()))).dim()
            ));
        } else {
            spinner.finish_with_message(format!(
                "{} Sent {}/{} chunk(s): {}",
                style("✗").red().bold(),
                summary.chunks_sent,
                summary.chunk_count,
                style(summary.error.as_deref().unwrap_or("unknown error")).red()
            ));
        }
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(match summary.error_kind {
        None => 0,
        Some(ErrorKind::Cancelled) => 130,
        Some(_) => 1,
    })
}

pub async fn shorten(text: String, json: bool, cancel: &CancellationToken) -> Result<i32> {
    let text = text_or_stdin(text).await?;
    let shortener = BitlyShortener::from_credentials(&Credentials::from_env())?;

    let spinner = (!json).then(|| create_spinner("Shortening links..."));
    let result = shorten_links(&text, &shortener, cancel).await;
    if let Some(spinner) = &spinner {
        spinner.finish_and_clear();
    }
    let shortened = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&shortened)?);
    } else {
        for url in &shortened.kept {
            eprintln!("{} {}", style("Kept:").yellow(), url);
        }
        println!("{}", shortened.text);
    }
    Ok(0)
}

pub async fn transcript(
    url: &str,
    lang: &str,
    fallback_languages: Vec<String>,
    json: bool,
    cancel: &CancellationToken,
) -> Result<i32> {
    let video_id = extract_video_id(url)?;
    let mut config = PipelineConfig::new(Credentials::from_env());
    config.language = lang.to_string();
    config.notify = false;
    let services = SummaryServices::from_config(&config)?;

    let request = SummarizeRequest::new(url, &video_id)
        .with_language(lang)
        .with_fallback_languages(fallback_languages);
    let runner = ProviderFallbackRunner::new(config.poll.clone());

    let start = Instant::now();
    let spinner = (!json).then(|| create_spinner("Extracting transcript..."));
    let result = extract_transcript(&runner, &services.transcript, &request, cancel).await;
    if let Some(spinner) = &spinner {
        spinner.finish_and_clear();
    }
    let success = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&success.data)?);
    } else {
        eprintln!(
            "{} Transcript extracted via {} {}",
            style("✓").green().bold(),
            style(&success.provider).yellow(),
            style(format!("[{}]", format_duration(start.elapsed()))).dim()
        );
        print_rule();
        println!("{}", format_transcript_readable(&success.data));
    }
    Ok(0)
}

pub async fn info(url: &str, json: bool, cancel: &CancellationToken) -> Result<i32> {
    let video_id = extract_video_id(url)?;
    let client = YouTubeDataClient::from_credentials(&Credentials::from_env())?;

    let reply = tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(TubeDigestError::Cancelled),
        reply = client.call(&video_id) => reply,
    };
    let info = reply?
        .ok_or_else(|| TubeDigestError::InvalidResponse {
            reason: format!("video {video_id} not found"),
        })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}", format_video_info_readable(&info));
    }
    Ok(0)
}
