use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tubedigest_core::{
    NOTIFY_STAGE, PipelineObserver, PipelineRun, RunOutcome, SHORTEN_STAGE, SUMMARY_STAGE,
    StageDefinition, StageRecord, StageResult, TRANSCRIPT_STAGE, VIDEO_INFO_STAGE,
};

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let spinner_style = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(spinner_style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn print_header(subtitle: &str) {
    eprintln!(
        "\n{}  {}\n",
        style("tubedigest").cyan().bold(),
        style(subtitle).dim()
    );
}

pub fn print_rule() {
    eprintln!("{}", style("─".repeat(60)).dim());
}

fn running_label(stage: &str) -> String {
    match stage {
        TRANSCRIPT_STAGE => "Extracting transcript...".to_string(),
        VIDEO_INFO_STAGE => "Fetching video info...".to_string(),
        SUMMARY_STAGE => "Generating summary...".to_string(),
        SHORTEN_STAGE => "Shortening links...".to_string(),
        NOTIFY_STAGE => "Sending to Discord...".to_string(),
        other => format!("Running {other}..."),
    }
}

fn done_label(stage: &str) -> &str {
    match stage {
        TRANSCRIPT_STAGE => "Transcript extracted",
        VIDEO_INFO_STAGE => "Video info fetched",
        SUMMARY_STAGE => "Summary generated",
        SHORTEN_STAGE => "Links shortened",
        NOTIFY_STAGE => "Sent to Discord",
        other => other,
    }
}

fn detail(record: &StageRecord) -> String {
    let StageResult::Ok { value } = &record.result else {
        return String::new();
    };
    match record.name.as_str() {
        TRANSCRIPT_STAGE => format!(
            ": {} chars via {}",
            value["merged"].as_str().map_or(0, |text| text.chars().count()),
            value["provider"].as_str().unwrap_or("?")
        ),
        VIDEO_INFO_STAGE => format!(": {}", value["title"].as_str().unwrap_or("?")),
        SUMMARY_STAGE => format!(
            " ({})",
            style(value["provider"].as_str().unwrap_or("?")).yellow()
        ),
        SHORTEN_STAGE => format!(
            ": {}",
            value["links"].as_object().map_or(0, |links| links.len())
        ),
        NOTIFY_STAGE => format!(": {} chunk(s)", value["chunks_sent"]),
        _ => String::new(),
    }
}

/// Draws one spinner per running stage on stderr.
pub struct SpinnerObserver {
    enabled: bool,
    current: Mutex<Option<(ProgressBar, Instant)>>,
}

impl SpinnerObserver {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            current: Mutex::new(None),
        }
    }

    fn finish_line(record: &StageRecord, elapsed: Duration) -> String {
        let timing = if record.reused {
            style("(cached)".to_string()).dim()
        } else {
            style(format!("[{}]", format_duration(elapsed))).dim()
        };

        match &record.result {
            StageResult::Ok { .. } => format!(
                "{} {}{} {}",
                style("✓").green().bold(),
                done_label(&record.name),
                detail(record),
                timing
            ),
            StageResult::Skipped { reason } => format!(
                "{} {} skipped: {} {}",
                style("!").yellow().bold(),
                record.name,
                style(reason).yellow(),
                timing
            ),
            StageResult::Failed { error } => format!(
                "{} {} failed: {} {}",
                style("✗").red().bold(),
                record.name,
                style(error).red(),
                timing
            ),
        }
    }
}

impl PipelineObserver for SpinnerObserver {
    fn stage_started(&self, stage: &StageDefinition) {
        if !self.enabled {
            return;
        }
        if let Ok(mut current) = self.current.lock() {
            *current = Some((create_spinner(&running_label(&stage.name)), Instant::now()));
        }
    }

    fn stage_finished(&self, record: &StageRecord) {
        if !self.enabled {
            return;
        }
        if let Ok(mut current) = self.current.lock()
            && let Some((spinner, started)) = current.take()
        {
            spinner.finish_with_message(Self::finish_line(record, started.elapsed()));
        }
    }
}

pub fn print_run_footer(run: &PipelineRun, elapsed: Duration) {
    eprintln!(
        "\n{} {}",
        style("Total time:").dim(),
        style(format_duration(elapsed)).cyan().bold()
    );

    match run.outcome {
        RunOutcome::Success => {}
        RunOutcome::Partial => eprintln!(
            "{} {}",
            style("Outcome:").dim(),
            style("partial (optional stages skipped)").yellow()
        ),
        RunOutcome::Failed => {
            if let Some(failure) = &run.failure {
                eprintln!(
                    "{} stage '{}' failed ({}): {}",
                    style("Error:").red().bold(),
                    failure.stage,
                    failure.kind,
                    failure.message
                );
            }
            let finished: Vec<&str> = run
                .stages
                .iter()
                .filter(|record| record.result.is_ok())
                .map(|record| record.name.as_str())
                .collect();
            if !finished.is_empty() {
                eprintln!(
                    "{} {} (cached, rerun to resume)",
                    style("Completed:").dim(),
                    finished.join(", ")
                );
            }
        }
    }
}
