use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::*;

use crate::config::Config;
use crate::cycle::CycleReport;
use crate::error::Result;
use crate::types::{Fix, IssueType, Outcome, Pattern, Severity, Trend};

#[derive(Parser, Debug)]
#[command(name = "rsi-loop")]
#[command(version)]
#[command(about = "Detect recurring failure patterns in AI agent task outcomes and propose fixes")]
pub struct Args {
    /// TOML configuration file (keys not set keep their defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Store directory; overrides `data_dir` from the config file
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record one task outcome
    Record {
        /// Task type, e.g. code_gen or api_call
        #[arg(long)]
        task: String,

        /// Mark the task as failed
        #[arg(long)]
        fail: bool,

        /// Error message (classified automatically unless --issue is given)
        #[arg(long)]
        error: Option<String>,

        /// Explicit issue type, e.g. rate_limit
        #[arg(long)]
        issue: Option<IssueType>,

        /// Self-reported quality, 1-5
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        quality: Option<u8>,

        /// Reporting agent or service
        #[arg(long, default_value = crate::types::DEFAULT_SOURCE)]
        source: String,

        /// Model that served the task
        #[arg(long)]
        model: Option<String>,
    },

    /// Analyse the current window without saving anything
    Analyze {
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Print the health score of the current window
    Health,

    /// List saved fix proposals
    Fixes {
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Run one improvement cycle, or keep running every --interval seconds
    Run {
        /// Repeat in the background until Ctrl+C
        #[arg(long)]
        interval: Option<u64>,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Ingest outcome files from an inbox directory
    Poll {
        /// Directory agents drop *.json outcome files into
        #[arg(long, default_value = "./rsi_inbox")]
        inbox: PathBuf,

        /// Run a cycle after ingesting
        #[arg(long)]
        cycle: bool,
    },

    /// Serve the HTTP webhook
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value = "8900")]
        port: u16,
    },

    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl Args {
    /// Defaults, layered with `--config` and then `--data-dir`, validated.
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Build the outcome described by `rsi-loop record`.
#[allow(clippy::too_many_arguments)]
pub fn outcome_from_args(
    task: &str,
    fail: bool,
    error: Option<&str>,
    issue: Option<IssueType>,
    quality: Option<u8>,
    source: &str,
    model: Option<&str>,
) -> Outcome {
    let mut outcome = Outcome::new(task, !fail).with_source(source);
    outcome.error = error.map(str::to_string);
    outcome.issue = issue;
    outcome.quality = quality;
    outcome.model = model.map(str::to_string);
    outcome
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn severity_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::High => "HIGH".bright_red().bold(),
        Severity::Medium => "MED".bright_yellow(),
        Severity::Low => "LOW".bright_blue(),
    }
}

fn trend_label(trend: Option<Trend>) -> ColoredString {
    match trend {
        Some(Trend::New) => "new".bright_cyan(),
        Some(Trend::Increasing) => "increasing".bright_red(),
        Some(Trend::Stable) => "stable".normal(),
        Some(Trend::Decreasing) => "decreasing".bright_green(),
        None => "-".dimmed(),
    }
}

pub fn render_health(score: f64) -> String {
    let value = format!("{:.2}", score);
    let value = if score >= 0.8 {
        value.bright_green()
    } else if score >= 0.5 {
        value.bright_yellow()
    } else {
        value.bright_red()
    };
    format!("health: {}", value)
}

pub fn render_pattern(p: &Pattern) -> String {
    let mut line = format!(
        "[{}] {} {}x ({}) {}\n      -> {}",
        severity_label(p.severity),
        p.id.dimmed(),
        p.occurrences,
        trend_label(p.trend),
        p.description,
        p.suggested_action
    );
    if !p.sources.is_empty() {
        let sources: Vec<&str> = p.sources.iter().map(String::as_str).collect();
        line.push_str(&format!("\n      sources: {}", sources.join(", ")));
    }
    line
}

pub fn render_fix(f: &Fix) -> String {
    let status = if f.is_applied() { "applied".bright_green() } else { "draft".bright_yellow() };
    let mut line = format!("{} [{}] {} ({})", f.id.dimmed(), status, f.description, f.safe_category);
    for change in &f.changes {
        line.push_str(&format!("\n      {}: {} ({})", change.target, change.action, change.detail));
    }
    line
}

pub fn render_patterns(patterns: &[Pattern]) -> String {
    if patterns.is_empty() {
        return "no recurring patterns".bright_green().to_string();
    }
    patterns.iter().map(render_pattern).collect::<Vec<_>>().join("\n")
}

pub fn render_report(report: &CycleReport) -> String {
    let mut out = format!(
        "{}  outcomes: {}  patterns: {}  fixes: {} ({} applied)\n",
        render_health(report.health),
        report.outcomes,
        report.patterns.len(),
        report.fixes.len(),
        report.applied()
    );
    out.push_str(&render_patterns(&report.patterns));
    out
}
