use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use console::style;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tubedigest_core::{
    LlmProvider, TubeDigestError,
    config::{DEFAULT_FALLBACK_LANGUAGES, DEFAULT_LANGUAGE},
};

mod commands;
mod render;

/// CLI wrapper for LlmProvider (needed for clap ValueEnum)
#[derive(Clone, Copy, ValueEnum)]
enum CliProvider {
    Anthropic,
    Grok,
    Openai,
    Gemini,
}

impl From<CliProvider> for LlmProvider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Anthropic => LlmProvider::Anthropic,
            CliProvider::Grok => LlmProvider::Grok,
            CliProvider::Openai => LlmProvider::Openai,
            CliProvider::Gemini => LlmProvider::Gemini,
        }
    }
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "tubedigest", version)]
#[command(
    about = "Extract YouTube transcripts, summarize them with AI providers, and post the summary to Discord"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Log line format on stderr
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: transcript, summary, Discord
    Summarize(SummarizeArgs),
    /// Post a message to Discord, chunked and rate-limit aware
    Send(SendArgs),
    /// Replace the links in a text with Bitly short links
    Shorten {
        /// Text containing links, or "-" to read stdin
        text: String,
    },
    /// Print the transcript of a video
    Transcript {
        /// Video URL or id
        url: String,

        /// Transcript language
        #[arg(short, long, default_value = DEFAULT_LANGUAGE)]
        lang: String,

        /// Transcript language tried when none exists in --lang, repeatable
        #[arg(long = "fallback-lang", default_values_t = default_fallback_languages())]
        fallback_lang: Vec<String>,
    },
    /// Print video metadata from the YouTube Data API
    Info {
        /// Video URL or id
        url: String,
    },
}

#[derive(Args)]
struct SummarizeArgs {
    /// Video URL or id
    url: String,

    /// Transcript and summary language (e.g., "ko", "en")
    #[arg(short, long, default_value = DEFAULT_LANGUAGE)]
    lang: String,

    /// Transcript language tried when none exists in --lang, repeatable
    #[arg(long = "fallback-lang", default_values_t = default_fallback_languages())]
    fallback_lang: Vec<String>,

    /// Write the summary here instead of summary_<video_id>.md
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Summary provider, repeat to set the fallback order
    #[arg(short, long, value_enum)]
    provider: Vec<CliProvider>,

    /// Skip posting the summary to Discord
    #[arg(long)]
    no_discord: bool,

    /// Replace links with Bitly short links before posting (needs BITLY_TOKEN)
    #[arg(long)]
    shorten_links: bool,

    /// Include YouTube metadata in the summary prompt
    #[arg(long)]
    with_video_info: bool,

    /// Markdown file replacing the built-in summary guide
    #[arg(long)]
    guide: Option<PathBuf>,

    /// Ignore cached stage outputs
    #[arg(short, long)]
    force: bool,

    /// Cancel the run after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Args)]
struct SendArgs {
    /// Message text, or "-" to read stdin
    message: String,

    /// Channel to post to instead of DISCORD_CHANNEL_ID
    #[arg(long)]
    channel_id: Option<String>,

    /// Largest chunk posted in one message
    #[arg(long, default_value_t = tubedigest_core::config::DEFAULT_MAX_CHUNK_SIZE)]
    max_chunk_size: usize,
}

fn default_fallback_languages() -> Vec<String> {
    DEFAULT_FALLBACK_LANGUAGES
        .iter()
        .map(|lang| lang.to_string())
        .collect()
}

fn init_tracing(verbose: u8, format: LogFormat) {
    let default_filter = match verbose {
        0 => "tubedigest=info,tubedigest_core=warn",
        1 => "tubedigest=debug,tubedigest_core=debug",
        _ => "tubedigest=trace,tubedigest_core=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Token cancelled on Ctrl-C, or once `timeout` elapses.
fn cancel_on_signal(timeout: Option<Duration>) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => warn!("Interrupted, cancelling"),
            _ = deadline => warn!("Timed out, cancelling"),
        }
        token.cancel();
    });

    cancel
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Command::Summarize(args) => {
            let cancel = cancel_on_signal(args.timeout.map(Duration::from_secs));
            commands::summarize(args, cli.json, &cancel).await
        }
        Command::Send(args) => {
            let cancel = cancel_on_signal(None);
            commands::send(args, cli.json, &cancel).await
        }
        Command::Shorten { text } => {
            let cancel = cancel_on_signal(None);
            commands::shorten(text, cli.json, &cancel).await
        }
        Command::Transcript {
            url,
            lang,
            fallback_lang,
        } => {
            let cancel = cancel_on_signal(None);
            commands::transcript(&url, &lang, fallback_lang, cli.json, &cancel).await
        }
        Command::Info { url } => {
            let cancel = cancel_on_signal(None);
            commands::info(&url, cli.json, &cancel).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match run(cli).await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            let cancelled = err
                .downcast_ref::<TubeDigestError>()
                .is_some_and(TubeDigestError::is_cancelled);
            eprintln!("{} {:#}", style("Error:").red().bold(), err);
            ExitCode::from(if cancelled { 130 } else { 1 })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn providers_keep_their_order() {
        let cli = Cli::parse_from([
            "tubedigest",
            "summarize",
            "https://youtu.be/dQw4w9WgXcQ",
            "-p",
            "openai",
            "-p",
            "anthropic",
            "--no-discord",
        ]);
        let Command::Summarize(args) = cli.command else {
            panic!("expected summarize");
        };
        let providers: Vec<LlmProvider> = args.provider.into_iter().map(Into::into).collect();
        assert_eq!(providers, vec![LlmProvider::Openai, LlmProvider::Anthropic]);
        assert!(args.no_discord);
        assert!(!args.shorten_links);
        assert_eq!(args.lang, "ko");
        assert_eq!(args.fallback_lang, vec!["en".to_string()]);
    }

    #[test]
    fn fallback_languages_repeat() {
        let cli = Cli::parse_from([
            "tubedigest",
            "transcript",
            "abc",
            "--fallback-lang",
            "en",
            "--fallback-lang",
            "ja",
        ]);
        let Command::Transcript { fallback_lang, .. } = cli.command else {
            panic!("expected transcript");
        };
        assert_eq!(fallback_lang, vec!["en".to_string(), "ja".to_string()]);
    }

    #[test]
    fn shorten_takes_text_or_stdin() {
        let cli = Cli::parse_from(["tubedigest", "shorten", "-"]);
        assert!(matches!(cli.command, Command::Shorten { text } if text == "-"));
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::parse_from(["tubedigest", "info", "abc", "--json", "-vv"]);
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
    }
}
