//! CLI entry point for the ebook-dl tool.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use ebook_dl_core::{Catalog, CrawlConfig, Database, Pipeline, PipelineError};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

mod app_config;
mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = build_config(&args)?;
    info!(
        base_url = %config.base_url,
        database = %config.database_path.display(),
        "ebook-dl starting"
    );

    let db = Database::new(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database '{}'", config.database_path.display()))?;
    let result = run(&args, config, Catalog::new(db.clone())).await;
    db.close().await;
    result
}

async fn run(args: &Args, config: CrawlConfig, catalog: Catalog) -> Result<()> {
    if args.command == Command::Status {
        let counts = catalog.counts().await?;
        println!("Profile urls:       {}", counts.profiles);
        println!("Books:              {}", counts.books);
        println!("Download tokens:    {}", counts.downloads);
        println!("Resolved downloads: {}", counts.resolved);
        return Ok(());
    }

    let pipeline = Pipeline::new(Arc::new(config), Arc::new(catalog))?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; stopping at the next retry or item boundary");
            interrupt.cancel();
        }
    });

    let spinner = spawn_spinner(!args.quiet, spinner_message(&args.command));
    let outcome = run_command(&args.command, &pipeline, &cancel).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match outcome {
        Ok(()) => {
            debug!(retries = pipeline.fetcher().retry_events(), "fetch retries");
            Ok(())
        }
        Err(error) if error.is_cancelled() => bail!("interrupted"),
        Err(error) => Err(error.into()),
    }
}

/// Default < config file < CLI flags, then validated.
fn build_config(args: &Args) -> Result<CrawlConfig> {
    let mut config = CrawlConfig::default();

    if let Some(file) = app_config::load_file_config(args.config.as_deref())? {
        file.apply(&mut config);
    }

    if let Some(base_url) = &args.base_url {
        config.base_url.clone_from(base_url);
    }
    if let Some(user_agent) = &args.user_agent {
        config.user_agent.clone_from(user_agent);
    }
    if let Some(output_dir) = &args.output_dir {
        config.output_dir.clone_from(output_dir);
    }
    if let Some(database) = &args.database {
        config.database_path.clone_from(database);
    }
    for raw in &args.workers {
        let (kind, workers) = app_config::parse_worker_override(raw)?;
        config.workers.set(kind, workers);
    }
    if let Command::Search {
        keyword: Some(keyword),
    } = &args.command
    {
        config.search_key = keyword.trim().to_string();
    }

    config.validate()?;
    Ok(config)
}

async fn run_command(
    command: &Command,
    pipeline: &Pipeline,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    match command {
        Command::Search { .. } => {
            let summary = pipeline.search(cancel).await?;
            println!(
                "There are {} page(s) in total; found {} book urls ({} new).",
                summary.pages, summary.found, summary.stored
            );
        }
        Command::CollectBookInfo => {
            let summary = pipeline.collect_book_info(cancel).await?;
            println!("Profile url count:           {}", summary.status.profile_urls);
            println!("Unique book names from urls: {}", summary.status.unique_names);
            if summary.status.profile_urls == 0 {
                println!("No profile urls stored. Run `ebook-dl search` first.");
            } else {
                println!(
                    "Extracted {} book(s): {} new, {} new download token(s).",
                    summary.extracted, summary.books, summary.downloads
                );
            }
        }
        Command::ResourceUrl => {
            let summary = pipeline.collect_resource_urls(cancel).await?;
            if summary.pending == 0 {
                println!("No unresolved downloads. Run `ebook-dl collect-book-info` first.");
            } else {
                println!(
                    "Resolved {} of {} download token(s).",
                    summary.resolved, summary.pending
                );
            }
        }
        Command::DownloadAll => {
            let summary = pipeline.download_all(cancel).await?;
            if summary.pending == 0 {
                println!("No resolved downloads. Run `ebook-dl resource-url` first.");
            } else {
                println!(
                    "Saved {}, already present {}, skipped {} of {} download(s).",
                    summary.saved, summary.existing, summary.skipped, summary.pending
                );
            }
        }
        Command::Status => {}
    }
    Ok(())
}

fn spinner_message(command: &Command) -> &'static str {
    match command {
        Command::Search { .. } => "Retrieving book profile page urls...",
        Command::CollectBookInfo => "Collecting book info...",
        Command::ResourceUrl => "Resolving resource urls...",
        Command::DownloadAll => "Downloading...",
        Command::Status => "",
    }
}

fn spawn_spinner(enabled: bool, message: &'static str) -> Option<ProgressBar> {
    let dumb_terminal = std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false);
    if !enabled || dumb_terminal || !io::stderr().is_terminal() {
        return None;
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Some(spinner)
}
