//! vidrelay: watch a recordings folder and upload each new video.

mod config;
mod console_prompter;
mod drive_store;
mod logging;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vidrelay_pipeline::{
    AutoPrompter, LocalFolderStore, ObjectStore, Pipeline, PipelineEvent, Prompter, Question,
    watch_directory,
};

use config::{AppConfig, StoreConfig};
use console_prompter::ConsolePrompter;
use drive_store::DriveStore;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "setup failed");
            eprintln!("vidrelay: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let mut config = AppConfig::load()?;
    if let Err(e) = logging::init(&config.log_file) {
        warn!(path = %config.log_file.display(), error = %e, "cannot open event log, logging to stderr only");
    }
    for warning in config.take_warnings() {
        warn!("{warning}");
    }
    info!(config = %config.file_path().display(), "vidrelay starting");

    let prompter: Arc<dyn Prompter> = if config.interactive {
        Arc::new(ConsolePrompter::stdin())
    } else {
        Arc::new(AutoPrompter::new(config.headless.clone()))
    };

    ensure_watch_dir(&config.watch_dir, prompter.as_ref()).await?;
    let store = open_store(&config, prompter.as_ref()).await?;
    info!(store = store.label(), dir = %config.watch_dir.display(), "setup complete");

    // Started before the backlog scan so nothing created meanwhile is missed.
    let (watcher, files) = watch_directory(&config.watch_dir)
        .with_context(|| format!("cannot watch {}", config.watch_dir.display()))?;

    let mut pipeline = Pipeline::new(store, prompter, config.pipeline_settings());
    if let Some(events) = pipeline.take_events() {
        tokio::spawn(report_events(events, config.interactive));
    }

    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current upload");
            cancel.cancel();
        }
    });

    let summary = pipeline.run(files).await;
    drop(watcher);
    info!(
        uploaded = summary.uploaded,
        skipped = summary.skipped,
        failed = summary.failed,
        relocated = summary.relocated,
        "vidrelay stopped"
    );
    Ok(())
}

async fn ensure_watch_dir(dir: &Path, prompter: &dyn Prompter) -> anyhow::Result<()> {
    loop {
        match std::fs::create_dir_all(dir).and_then(|_| std::fs::read_dir(dir).map(drop)) {
            Ok(()) => return Ok(()),
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "watch directory unusable");
                let text = format!("Cannot use watch directory {} ({e}). Retry?", dir.display());
                if !prompter.ask_yes_no(Question::RetrySetup, &text).await {
                    return Err(e).with_context(|| format!("watch directory {}", dir.display()));
                }
            }
        }
    }
}

async fn open_store(
    config: &AppConfig,
    prompter: &dyn Prompter,
) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match &config.store {
        StoreConfig::Local { root } => loop {
            if root.is_dir() {
                return Ok(Arc::new(LocalFolderStore::new(root, config.chunk_size)));
            }
            let text = format!("Store directory {} does not exist. Retry?", root.display());
            if !prompter.ask_yes_no(Question::RetrySetup, &text).await {
                bail!("store directory {} does not exist", root.display());
            }
        },
        StoreConfig::Drive {
            token_file,
            token_env,
        } => {
            let token_file = token_file
                .clone()
                .unwrap_or_else(|| config.default_token_file());
            loop {
                if let Some(token) = read_token(token_env, &token_file) {
                    let client = vidrelay_drive::Client::new(&token)?;
                    return Ok(Arc::new(DriveStore::new(client, config.chunk_size)));
                }
                warn!(env = %token_env, file = %token_file.display(), "no Drive access token");
                let text = format!(
                    "No Drive access token found. Set ${token_env} or write the token to {}. Retry?",
                    token_file.display()
                );
                if !prompter.ask_yes_no(Question::RetrySetup, &text).await {
                    bail!("missing Drive access token");
                }
            }
        }
    }
}

/// Token from `env`, falling back to the contents of `file`.
fn read_token(env: &str, file: &Path) -> Option<String> {
    std::env::var(env)
        .ok()
        .or_else(|| std::fs::read_to_string(file).ok())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

async fn report_events(mut events: mpsc::Receiver<PipelineEvent>, interactive: bool) {
    while let Some(event) = events.recv().await {
        match event {
            PipelineEvent::Progress {
                path,
                percent,
                bytes_per_second,
                ..
            } if interactive => {
                let name = path.file_name().unwrap_or_default().to_string_lossy();
                println!(
                    "  {name}: {percent:>3}% ({:.1} MB/s)",
                    bytes_per_second / 1_000_000.0
                );
            }
            PipelineEvent::StateChanged { path, state } => {
                debug!(path = %path.display(), ?state, "state changed");
            }
            other => debug!(event = ?other, "pipeline event"),
        }
    }
}
