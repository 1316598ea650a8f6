use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use colored::*;
use tracing_subscriber::EnvFilter;

use rsi_loop::adapters::{webhook, InboxAdapter};
use rsi_loop::analysis::engine::Engine;
use rsi_loop::cli::{self, Args, Command};
use rsi_loop::ImprovementLoop;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Command::Completions { shell } = &args.command {
        clap_complete::generate(*shell, &mut Args::command(), "rsi-loop", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing();
    let config = args.resolve_config()?;
    let rsi = Arc::new(ImprovementLoop::open(config.clone())?);

    match args.command {
        Command::Record { task, fail, error, issue, quality, source, model } => {
            let outcome = cli::outcome_from_args(
                &task,
                fail,
                error.as_deref(),
                issue,
                quality,
                &source,
                model.as_deref(),
            );
            let recorded = rsi.observer().record(outcome)?;
            let issue = recorded.issue.map(|i| i.to_string()).unwrap_or_else(|| "-".into());
            println!("{} {} (issue: {})", "recorded".bright_green(), recorded.id, issue);
        }

        Command::Analyze { json } => {
            let engine = Engine::new(config)?;
            let outcomes = rsi.observer().load_outcomes()?;
            let previous = rsi.last_patterns()?;
            let report = engine.run_analysis(&outcomes, &previous);
            if json {
                print_json(&report)?;
            } else {
                println!("{}", cli::render_health(report.health));
                println!("{}", cli::render_patterns(&report.patterns));
            }
        }

        Command::Health => {
            println!("{}", cli::render_health(rsi.health_score()?));
        }

        Command::Fixes { json } => {
            let fixes = rsi.fixes()?;
            if json {
                print_json(&fixes)?;
            } else if fixes.is_empty() {
                println!("{}", "no fix proposals".bright_blue());
            } else {
                for fix in &fixes {
                    println!("{}", cli::render_fix(fix));
                }
            }
        }

        Command::Run { interval: None, json } => {
            let report = rsi.run_cycle_async().await?;
            if json {
                print_json(&report)?;
            } else {
                println!("{}", cli::render_report(&report));
            }
        }

        Command::Run { interval: Some(secs), .. } => {
            let period = Duration::from_secs(secs.max(1));
            if let Some(handle) = rsi.start_background(period) {
                eprintln!("{}", format!("  running every {}s, Ctrl+C to stop", period.as_secs()).bright_blue());
                tokio::signal::ctrl_c().await?;
                handle.stop().await;
            }
        }

        Command::Poll { inbox, cycle } => {
            let adapter = InboxAdapter::new(rsi.observer().clone(), inbox);
            let ingested = adapter.poll()?;
            println!("{} {} outcome(s) from {}", "ingested".bright_green(), ingested.len(), adapter.watch_dir().display());
            if cycle {
                println!("{}", cli::render_report(&rsi.run_cycle_async().await?));
            }
        }

        Command::Serve { host, port } => {
            let addr = format!("{}:{}", host, port);
            eprintln!("{}", format!("  Webhook listening on http://{}", addr).bright_green());
            eprintln!("{}", "  Press Ctrl+C to stop.".bright_blue());
            tokio::select! {
                res = webhook::serve(&addr, Arc::clone(&rsi)) => res?,
                _ = tokio::signal::ctrl_c() => {}
            }
        }

        Command::Completions { .. } => {}
    }

    Ok(())
}
