//! Data types for the upload pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use vidrelay_file_ops::{DeleteOutcome, RelocationReport, StabilityOptions};

use crate::upload::UploadOptions;

/// A folder in the remote store. `id` is opaque; `name` is only matched and shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
}

impl RemoteFolder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Descriptor of a finished upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    pub web_link: Option<String>,
    /// Hex SHA-256 of the stored bytes, when the store reports one.
    pub sha256: Option<String>,
}

/// Where a file goes, or that it goes nowhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationChoice {
    Folder(RemoteFolder),
    Declined,
}

/// Per-file pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Detected,
    Stabilizing,
    AwaitingDestination,
    Uploading,
    Completed,
    Failed,
    Skipped,
}

/// Observability event emitted while files move through the pipeline.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StateChanged {
        path: PathBuf,
        state: FileState,
    },
    /// Coarse upload progress (one event per reporting step).
    Progress {
        path: PathBuf,
        percent: u8,
        bytes_sent: u64,
        bytes_total: u64,
        bytes_per_second: f64,
    },
    Uploaded {
        path: PathBuf,
        object: RemoteObject,
    },
    Failed {
        path: PathBuf,
        error: String,
    },
    Cleanup {
        path: PathBuf,
        outcome: DeleteOutcome,
    },
    BacklogRelocated {
        moved: usize,
        failed: usize,
    },
}

/// Final result for one file.
#[derive(Debug)]
pub enum FileOutcome {
    Uploaded {
        path: PathBuf,
        object: RemoteObject,
        /// `None` when the user kept the local copy.
        cleanup: Option<DeleteOutcome>,
    },
    Skipped {
        path: PathBuf,
        reason: String,
    },
    Failed {
        path: PathBuf,
        error: String,
    },
    /// Already handled earlier in this run.
    Duplicate(PathBuf),
}

impl FileOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FileOutcome::Uploaded { path, .. }
            | FileOutcome::Skipped { path, .. }
            | FileOutcome::Failed { path, .. }
            | FileOutcome::Duplicate(path) => path,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self, FileOutcome::Uploaded { .. })
    }
}

/// What happened to files found at startup.
#[derive(Debug)]
pub enum BacklogOutcome {
    Empty,
    Processed(Vec<FileOutcome>),
    Relocated(RelocationReport),
    /// The user dismissed the side-directory prompt; nothing was touched.
    Untouched(usize),
}

/// Counters for a whole run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub relocated: usize,
}

impl RunSummary {
    pub(crate) fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Uploaded { .. } => self.uploaded += 1,
            FileOutcome::Skipped { .. } => self.skipped += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
            FileOutcome::Duplicate(_) => {}
        }
    }
}

/// Settings for a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub watch_dir: PathBuf,
    /// Extensions without the dot, matched case-insensitively.
    pub extensions: Vec<String>,
    pub stability: StabilityOptions,
    /// How long a folder suggestion waits before it is accepted.
    pub confirm_timeout: Duration,
    pub upload: UploadOptions,
    pub delete_max_attempts: u32,
    pub delete_base_delay: Duration,
    /// Side directory for bypassed backlog files (relative to `watch_dir`
    /// unless absolute).
    pub backlog_dir: String,
    pub prompt_rename: bool,
    /// Name matched against remote folders. Defaults to the watch
    /// directory's own name.
    pub folder_hint: Option<String>,
}

impl PipelineSettings {
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            extensions: vec!["mp4".into()],
            stability: StabilityOptions::default(),
            confirm_timeout: Duration::from_secs(5),
            upload: UploadOptions::default(),
            delete_max_attempts: 5,
            delete_base_delay: Duration::from_secs(1),
            backlog_dir: "bypassed".into(),
            prompt_rename: true,
            folder_hint: None,
        }
    }

    /// The string matched against remote folder names.
    pub fn folder_hint(&self) -> String {
        match &self.folder_hint {
            Some(hint) => hint.clone(),
            None => self
                .watch_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}
