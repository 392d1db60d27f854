//! Pipeline error types.

use std::path::PathBuf;

use vidrelay_file_ops::{FileOpsError, StabilityError};
use vidrelay_transfer::TransferError;

/// Errors reported by an [`ObjectStore`](crate::ObjectStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("remote error: {message}")]
    Remote { message: String, transient: bool },

    #[error("folder not found: {0}")]
    FolderNotFound(String),
}

impl StoreError {
    /// `true` if repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Remote { transient, .. } => *transient,
            StoreError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Errors that end a single upload attempt.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("cannot read {path}: {source}")]
    Local {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start upload session: {0}")]
    Start(#[source] StoreError),

    #[error("chunk send failed after {bytes_sent}/{bytes_total} bytes: {source}")]
    Chunk {
        bytes_sent: u64,
        bytes_total: u64,
        #[source]
        source: StoreError,
    },

    #[error("upload made no progress for {0} consecutive chunks")]
    Stalled(u32),

    #[error("store finished the upload without an object id")]
    MissingObjectId,

    #[error("checksum mismatch: local {local}, remote {remote}")]
    ChecksumMismatch { local: String, remote: String },

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}

/// Errors that end the processing of one file.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("stabilization failed: {0}")]
    Stability(#[from] StabilityError),

    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("file operation failed: {0}")]
    FileOps(#[from] FileOpsError),

    #[error("destination declined")]
    Declined,

    #[error("cancelled")]
    Cancelled,
}
