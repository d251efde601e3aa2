//! Episub - resumable catalog transcription and subtitle translation
//!
//! Entry point: parses the command line, sets up logging and configuration,
//! and dispatches to the batch run or one of the maintenance commands.

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use episub::catalog::{CatalogWalker, HttpCatalogClient};
use episub::cli::{Args, Commands};
use episub::config::{Config, LanguageEntry, TranscriberImplementation};
use episub::error::EpisubError;
use episub::inspect;
use episub::state::StateStore;
use episub::translate::OllamaClient;
use episub::unit::OutputLayout;
use episub::workflow::Workflow;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    let _log_guard = setup_logging(args.verbose)?;
    info!("Starting Episub - catalog transcription and translation");

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Run { implementation, model, translation_model, languages, dry_run } => {
            if let Some(implementation) = implementation {
                config.transcriber.implementation = parse_implementation(&implementation)?;
            }
            if let Some(model) = model {
                config.transcriber.model = model;
            }
            if let Some(translation_model) = translation_model {
                config.translate.model = translation_model;
            }
            config.validate()?;

            let only = languages.map(|list| {
                list.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            });
            let languages = config.select_languages(only.as_deref())?;

            run(&config, languages, dry_run).await?;
        }
        Commands::Status => {
            let store = StateStore::new(&config.run.state_file);
            let rows = inspect::summarize(&store.load());

            if rows.is_empty() {
                println!("No units recorded in {}", store.path().display());
            } else {
                println!("\n{:<20} {:<12} {:>8} {:>10}", "Model", "Language", "Done", "Not done");
                println!("{}", "-".repeat(53));
                for row in rows {
                    println!("{:<20} {:<12} {:>8} {:>10}", row.model, row.language, row.done, row.not_done);
                }
            }
        }
        Commands::Verify { fix } => {
            let store = StateStore::new(&config.run.state_file);
            let state = store.load();
            let layout = OutputLayout::new(&config.run.output_dir);
            let report = inspect::verify(&state, &layout).await;

            println!("\nDone units without a subtitle file: {}", report.missing.len());
            for key in &report.missing {
                println!("  {}", key);
            }
            println!("Subtitle files not marked done: {}", report.untracked.len());
            for path in &report.untracked {
                println!("  {}", path.display());
            }

            if fix && !report.missing.is_empty() {
                let _lock = store.lock()?;
                let mut state = store.load();
                for key in &report.missing {
                    state.demote(key);
                }
                store.persist(&state)?;
                println!("Marked {} units as pending again", report.missing.len());
            }
        }
        Commands::Init { path, force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists, pass --force to overwrite it", path.display());
            }
            Config::default().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        Commands::Catalog => {
            let walker = CatalogWalker::new(Box::new(HttpCatalogClient::new(&config.catalog)?));

            println!("\n{:<12} {:<40} {:>9} {:>9}", "Video", "Title", "Episodes", "No media");
            println!("{}", "-".repeat(73));
            for video in walker.videos().await {
                let episodes = walker.episodes(&video).await;
                let without_media = episodes.iter().filter(|e| !e.has_media()).count();
                println!(
                    "{:<12} {:<40} {:>9} {:>9}",
                    video.id,
                    video.title.as_deref().unwrap_or("-"),
                    episodes.len(),
                    without_media
                );
            }
        }
    }

    info!("Episub completed");
    Ok(())
}

async fn run(config: &Config, languages: Vec<LanguageEntry>, dry_run: bool) -> Result<()> {
    if !dry_run {
        let ollama = OllamaClient::new(&config.translate)?;
        if let Err(e) = ollama.check_availability(&config.translate.model).await {
            warn!("Translations will fail until Ollama is reachable: {}", e);
        }
    }

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} videos {msg}")?
            .progress_chars("#>-"),
    );

    let workflow = Workflow::from_config(config, languages)?
        .dry_run(dry_run)
        .with_progress(progress);

    tokio::select! {
        report = workflow.run() => {
            let report = report?;

            if dry_run {
                println!("\nUnits that would run: {}", report.planned.len());
                for key in &report.planned {
                    println!("  {} ({})", key, key.stage());
                }
            } else {
                println!("\nVideos: {}  Episodes: {}  Without media: {}",
                    report.videos, report.episodes, report.skipped_no_media);
                println!("Transcribed: {}  Translated: {}  Already done: {}  Deferred: {}",
                    report.transcribed, report.translated, report.skipped_done, report.blocked);

                if !report.failed.is_empty() {
                    println!("Failed units ({}), retried on the next run:", report.failed.len());
                    for key in &report.failed {
                        println!("  {}", key);
                    }
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!(
                "Interrupted; the next run resumes from {}",
                config.run.state_file.display()
            );
            anyhow::bail!("batch interrupted before completion");
        }
    }

    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".episub").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "episub.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("episub.log").display());

    Ok(guard)
}

/// Parse transcription implementation from string
fn parse_implementation(value: &str) -> Result<TranscriberImplementation> {
    match value.to_lowercase().as_str() {
        "whisper-cpp" | "whisper.cpp" | "whispercpp" => Ok(TranscriberImplementation::WhisperCpp),
        "openai" | "whisper" => Ok(TranscriberImplementation::OpenAI),
        _ => Err(EpisubError::Config(format!(
            "Invalid transcriber implementation '{}'. Valid values: whisper-cpp, openai",
            value
        )).into()),
    }
}
