use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::TransferError;

/// A chunk of file data for transfer.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Byte offset within the file.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// SHA-256 hex checksum of `data` (empty means no verification).
    pub checksum: String,
}

/// Lifecycle of a single upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Created,
    InProgress,
    Completed,
    Failed,
}

impl UploadState {
    fn can_move_to(self, next: UploadState) -> bool {
        use UploadState::*;
        matches!(
            (self, next),
            (Created, InProgress)
                | (InProgress, InProgress)
                | (InProgress, Completed)
                | (Created, Failed)
                | (InProgress, Failed)
        )
    }

    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Failed)
    }
}

/// Accounting for one file upload.
///
/// States only move forward. `bytes_sent` never decreases, never exceeds
/// `bytes_total`, and reaches `bytes_total` only through [`complete`].
///
/// [`complete`]: UploadTask::complete
#[derive(Debug)]
pub struct UploadTask {
    source_path: PathBuf,
    target_name: String,
    folder_id: String,
    bytes_total: u64,
    bytes_sent: u64,
    state: UploadState,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    error: Option<String>,
}

impl UploadTask {
    /// Creates a task in the `Created` state.
    pub fn new(
        source_path: &Path,
        target_name: impl Into<String>,
        folder_id: impl Into<String>,
        bytes_total: u64,
    ) -> Self {
        Self {
            source_path: source_path.to_path_buf(),
            target_name: target_name.into(),
            folder_id: folder_id.into(),
            bytes_total,
            bytes_sent: 0,
            state: UploadState::Created,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    fn transition(&mut self, next: UploadState) -> Result<(), TransferError> {
        if !self.state.can_move_to(next) {
            return Err(TransferError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Marks the task as in progress.
    pub fn start(&mut self) -> Result<(), TransferError> {
        self.transition(UploadState::InProgress)?;
        self.started_at.get_or_insert_with(Instant::now);
        Ok(())
    }

    /// Records the byte count acknowledged by the remote side.
    ///
    /// Regressions are ignored. While in progress the count is held one byte
    /// short of the total; the full count is reserved for completion.
    /// Returns the resulting `bytes_sent`.
    pub fn advance(&mut self, acknowledged: u64) -> Result<u64, TransferError> {
        self.transition(UploadState::InProgress)?;
        let ceiling = self.bytes_total.saturating_sub(1);
        self.bytes_sent = self.bytes_sent.max(acknowledged.min(ceiling));
        Ok(self.bytes_sent)
    }

    /// Marks the task as completed.
    pub fn complete(&mut self) -> Result<(), TransferError> {
        self.transition(UploadState::Completed)?;
        self.bytes_sent = self.bytes_total;
        self.finished_at = Some(Instant::now());
        Ok(())
    }

    /// Marks the task as failed. Failing a finished task is a no-op.
    pub fn fail(&mut self, err: &str) {
        if self.transition(UploadState::Failed).is_ok() {
            self.error = Some(err.to_string());
            self.finished_at = Some(Instant::now());
        }
    }

    /// Fraction of bytes acknowledged, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.bytes_total == 0 {
            return if self.state == UploadState::Completed {
                1.0
            } else {
                0.0
            };
        }
        self.bytes_sent as f64 / self.bytes_total as f64
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Time between `start` and completion or failure, if both happened.
    pub fn elapsed(&self) -> Option<std::time::Duration> {
        Some(self.finished_at?.duration_since(self.started_at?))
    }
}
