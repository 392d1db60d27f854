//! Local file handling for the upload pipeline.
//!
//! Everything that touches the watched directory lives here: waiting for a
//! recording to stop growing, renaming it, moving backlog files aside and
//! deleting uploaded files.

mod backlog;
mod delete;
mod rename;
mod stability;

use std::path::{Path, PathBuf};

pub use backlog::{RelocationReport, has_extension, list_videos, relocate_all};
pub use delete::{DeleteOutcome, delete_with_retry};
pub use rename::{normalize_video_name, rename_in_place};
pub use stability::{
    DEFAULT_POLL_INTERVAL, StabilityError, StabilityOptions, WatchedFile, await_stable,
    await_stable_with,
};

/// Errors produced by file operations other than stabilization.
#[derive(Debug, thiserror::Error)]
pub enum FileOpsError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("target already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error(transparent)]
    InvalidName(#[from] vidrelay_transfer::TransferError),
}

impl FileOpsError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        FileOpsError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
