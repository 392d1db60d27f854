//! Tracing setup: human-readable output on stderr plus an append-only event
//! log file.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "info,vidrelay=debug";

/// Installs the global subscriber. If the log file cannot be opened, logging
/// continues on stderr only and the error is returned for reporting.
pub fn init(log_file: &Path) -> Result<(), std::io::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let file = open_log(log_file);
    let (file_layer, result) = match file {
        Ok(file) => (
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
            Ok(()),
        ),
        Err(e) => (None, Err(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    result
}

fn open_log(path: &Path) -> Result<std::fs::File, std::io::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
