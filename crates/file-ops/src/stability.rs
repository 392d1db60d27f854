//! Write stabilization: wait until a file stops growing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default interval between size readings.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Errors that end a stabilization wait.
#[derive(Debug, thiserror::Error)]
pub enum StabilityError {
    #[error("cannot read size of {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} still growing after {waited:?} (last size {last_size:?})")]
    Timeout {
        path: PathBuf,
        waited: Duration,
        last_size: Option<u64>,
    },

    #[error("stabilization cancelled")]
    Cancelled,
}

/// Polling parameters.
#[derive(Debug, Clone, Copy)]
pub struct StabilityOptions {
    pub poll_interval: Duration,
    /// Upper bound on the wait. `None` waits for as long as the file grows.
    pub max_wait: Option<Duration>,
}

impl Default for StabilityOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
        }
    }
}

/// A file announced by the event source, plus the sizes observed so far.
#[derive(Debug, Clone)]
pub struct WatchedFile {
    pub path: PathBuf,
    pub detected_at: DateTime<Utc>,
    pub size_history: Vec<u64>,
}

impl WatchedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            detected_at: Utc::now(),
            size_history: Vec::new(),
        }
    }

    /// `true` once the last two readings are equal.
    pub fn is_stable(&self) -> bool {
        matches!(self.size_history.as_slice(), [.., a, b] if a == b)
    }

    /// Final size, available only once stable.
    pub fn stable_size(&self) -> Option<u64> {
        if self.is_stable() {
            self.size_history.last().copied()
        } else {
            None
        }
    }
}

/// Waits until the size of `file.path` is the same on two consecutive polls.
///
/// A file that disappears or becomes unreadable ends the wait with
/// [`StabilityError::Io`].
pub async fn await_stable(
    file: WatchedFile,
    options: StabilityOptions,
    cancel: &CancellationToken,
) -> Result<WatchedFile, StabilityError> {
    let path = file.path.clone();
    await_stable_with(file, || read_size(&path), options, cancel).await
}

fn read_size(path: &Path) -> std::io::Result<u64> {
    std::fs::metadata(path).map(|m| m.len())
}

/// Same as [`await_stable`] with an arbitrary size probe.
///
/// The first reading is taken immediately; each following reading comes one
/// `poll_interval` later.
pub async fn await_stable_with<F>(
    mut file: WatchedFile,
    mut probe: F,
    options: StabilityOptions,
    cancel: &CancellationToken,
) -> Result<WatchedFile, StabilityError>
where
    F: FnMut() -> std::io::Result<u64>,
{
    let started = Instant::now();

    loop {
        if cancel.is_cancelled() {
            return Err(StabilityError::Cancelled);
        }

        let size = probe().map_err(|source| StabilityError::Io {
            path: file.path.clone(),
            source,
        })?;
        file.size_history.push(size);
        trace!(path = %file.path.display(), size, polls = file.size_history.len(), "size reading");

        if file.is_stable() {
            debug!(
                path = %file.path.display(),
                size,
                polls = file.size_history.len(),
                "file size stable"
            );
            return Ok(file);
        }

        if let Some(max_wait) = options.max_wait {
            let waited = started.elapsed();
            if waited >= max_wait {
                return Err(StabilityError::Timeout {
                    path: file.path.clone(),
                    waited,
                    last_size: file.size_history.last().copied(),
                });
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(StabilityError::Cancelled),
            _ = tokio::time::sleep(options.poll_interval) => {}
        }
    }
}
