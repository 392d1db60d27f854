//! Deletion of uploaded local files.

use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

/// Result of [`delete_with_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { attempts: u32 },
    /// Every attempt failed; the file is left in place.
    StillLocked { attempts: u32, last_error: String },
}

impl DeleteOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted { .. })
    }
}

/// Deletes `path`, retrying with linear backoff (`attempt * base_delay`).
///
/// Makes at most `max_attempts` removal attempts. A file that is already gone
/// counts as deleted. Failure is reported, never raised: recorders commonly
/// hold a handle on the file for a moment after the upload finishes.
pub async fn delete_with_retry(path: &Path, max_attempts: u32, base_delay: Duration) -> DeleteOutcome {
    delete_with_retry_using(path, max_attempts, base_delay, |p| std::fs::remove_file(p)).await
}

async fn delete_with_retry_using<F>(
    path: &Path,
    max_attempts: u32,
    base_delay: Duration,
    mut remove: F,
) -> DeleteOutcome
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let mut last_error = String::from("no attempts allowed");

    for attempt in 1..=max_attempts {
        match remove(path) {
            Ok(()) => {
                info!(path = %path.display(), attempt, "deleted local file");
                return DeleteOutcome::Deleted { attempts: attempt };
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), attempt, "local file already gone");
                return DeleteOutcome::Deleted { attempts: attempt };
            }
            Err(e) => {
                warn!(path = %path.display(), attempt, max_attempts, error = %e, "delete failed");
                last_error = e.to_string();
                if attempt < max_attempts {
                    tokio::time::sleep(base_delay * attempt).await;
                }
            }
        }
    }

    DeleteOutcome::StillLocked {
        attempts: max_attempts,
        last_error,
    }
}
