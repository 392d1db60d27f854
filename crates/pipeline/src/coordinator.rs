//! Pipeline coordinator.
//!
//! Takes each detected file through stabilization, rename, destination
//! resolution, upload and cleanup, one file at a time. A failure in one file
//! is reported and the loop moves on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vidrelay_file_ops::{
    StabilityError, WatchedFile, await_stable, delete_with_retry, has_extension, list_videos,
    normalize_video_name, relocate_all, rename_in_place,
};

use crate::error::PipelineError;
use crate::prompt::{Field, Notice, Prompter, Question};
use crate::resolver::{DestinationResolver, list_folders_with_retry};
use crate::store::ObjectStore;
use crate::types::{
    BacklogOutcome, DestinationChoice, FileOutcome, FileState, PipelineEvent, PipelineSettings,
    RemoteFolder, RunSummary,
};
use crate::upload::Uploader;

/// Destination cache shared by the files of one batch.
///
/// Backlog files are processed as one shared batch: the first resolved
/// folder is reused for the rest. Live files each get a fresh single batch.
#[derive(Debug, Default)]
pub struct Batch {
    shared: bool,
    folder: Option<RemoteFolder>,
}

impl Batch {
    pub fn single() -> Self {
        Self::default()
    }

    pub fn shared() -> Self {
        Self {
            shared: true,
            folder: None,
        }
    }

    pub fn folder(&self) -> Option<&RemoteFolder> {
        self.folder.as_ref()
    }

    pub fn clear(&mut self) {
        self.folder = None;
    }

    fn remember(&mut self, folder: &RemoteFolder) {
        if self.shared {
            self.folder = Some(folder.clone());
        }
    }
}

/// Size and modification time of a handled file.
///
/// A file whose fingerprint changed since it was handled is a new recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

impl Fingerprint {
    fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Watch-folder upload pipeline.
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    prompter: Arc<dyn Prompter>,
    settings: PipelineSettings,
    events_tx: mpsc::Sender<PipelineEvent>,
    events_rx: Option<mpsc::Receiver<PipelineEvent>>,
    cancel: CancellationToken,
    /// Handled paths. `None` marks a path whose file was gone when its run
    /// ended; the next event for it is consumed as an echo.
    processed: HashMap<PathBuf, Option<Fingerprint>>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        prompter: Arc<dyn Prompter>,
        settings: PipelineSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            store,
            prompter,
            settings,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
            processed: HashMap::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<PipelineEvent>> {
        self.events_rx.take()
    }

    /// Returns the token that stops [`run`](Self::run).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Handles the backlog, then processes paths from `files` until the
    /// channel closes or the pipeline is cancelled.
    pub async fn run(&mut self, mut files: mpsc::UnboundedReceiver<PathBuf>) -> RunSummary {
        let mut summary = RunSummary::default();

        match self.handle_backlog().await {
            BacklogOutcome::Processed(outcomes) => {
                for outcome in &outcomes {
                    summary.record(outcome);
                }
            }
            BacklogOutcome::Relocated(report) => summary.relocated = report.moved.len(),
            BacklogOutcome::Empty | BacklogOutcome::Untouched(_) => {}
        }

        info!(dir = %self.settings.watch_dir.display(), "watching for new recordings");
        loop {
            let path = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = files.recv() => match next {
                    Some(path) => path,
                    None => break,
                },
            };

            if !has_extension(&path, &self.settings.extensions) {
                debug!(path = %path.display(), "ignoring non-video file");
                continue;
            }

            let outcome = self.process_file(&path, &mut Batch::single()).await;
            summary.record(&outcome);
        }

        info!(
            uploaded = summary.uploaded,
            skipped = summary.skipped,
            failed = summary.failed,
            relocated = summary.relocated,
            "pipeline stopped"
        );
        summary
    }

    /// Offers to process or move aside the video files already in the watch
    /// directory.
    pub async fn handle_backlog(&mut self) -> BacklogOutcome {
        let dir = self.settings.watch_dir.clone();
        let files = match list_videos(&dir, &self.settings.extensions) {
            Ok(files) => files,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cannot scan watch directory");
                return BacklogOutcome::Empty;
            }
        };
        if files.is_empty() {
            return BacklogOutcome::Empty;
        }

        info!(dir = %dir.display(), count = files.len(), "found existing recordings");
        let text = format!(
            "{} video file(s) are already in {}. Upload them now? Choosing no moves them aside.",
            files.len(),
            dir.display()
        );
        if self.prompter.ask_yes_no(Question::ProcessBacklog, &text).await {
            let mut batch = Batch::shared();
            let mut outcomes = Vec::with_capacity(files.len());
            for file in &files {
                if self.cancel.is_cancelled() {
                    break;
                }
                outcomes.push(self.process_file(file, &mut batch).await);
            }
            return BacklogOutcome::Processed(outcomes);
        }

        let Some(answer) = self
            .prompter
            .ask_string(
                Field::BacklogDirectory,
                "Move existing recordings into directory",
                &self.settings.backlog_dir,
            )
            .await
        else {
            info!(count = files.len(), "backlog left in place");
            return BacklogOutcome::Untouched(files.len());
        };

        let answer = answer.trim();
        let side_dir = dir.join(if answer.is_empty() {
            self.settings.backlog_dir.as_str()
        } else {
            answer
        });

        match relocate_all(&files, &side_dir) {
            Ok(report) => {
                info!(
                    dir = %side_dir.display(),
                    moved = report.moved.len(),
                    failed = report.failed.len(),
                    "backlog relocated"
                );
                self.emit(PipelineEvent::BacklogRelocated {
                    moved: report.moved.len(),
                    failed: report.failed.len(),
                });
                BacklogOutcome::Relocated(report)
            }
            Err(e) => {
                error!(dir = %side_dir.display(), error = %e, "cannot relocate backlog");
                self.prompter
                    .notify(Notice::error("Backlog", format!("Could not move files aside: {e}")));
                BacklogOutcome::Untouched(files.len())
            }
        }
    }

    /// Runs one file through the whole pipeline.
    ///
    /// A repeated event for a file this pipeline already handled yields
    /// [`FileOutcome::Duplicate`]. A different file saved later under the
    /// same name is processed again.
    pub async fn process_file(&mut self, path: &Path, batch: &mut Batch) -> FileOutcome {
        if self.is_repeat(path) {
            debug!(path = %path.display(), "already processed");
            return FileOutcome::Duplicate(path.to_path_buf());
        }

        self.set_state(path, FileState::Detected);
        let outcome = self.run_file(path, batch).await;
        self.mark_processed(path);
        if outcome.path() != path {
            self.mark_processed(outcome.path());
        }
        outcome
    }

    fn is_repeat(&mut self, path: &Path) -> bool {
        let Some(seen) = self.processed.remove(path) else {
            return false;
        };
        match Fingerprint::of(path) {
            None => true,
            Some(current) if Some(current) == seen => {
                self.processed.insert(path.to_path_buf(), seen);
                true
            }
            Some(_) => false,
        }
    }

    fn mark_processed(&mut self, path: &Path) {
        self.processed.insert(path.to_path_buf(), Fingerprint::of(path));
    }

    async fn run_file(&mut self, path: &Path, batch: &mut Batch) -> FileOutcome {
        match self.pipeline_file(path, batch).await {
            Ok(outcome) => outcome,
            Err(PipelineError::Declined) => {
                self.set_state(path, FileState::Skipped);
                self.prompter
                    .notify(Notice::warning("Upload", "Upload cancelled - no folder selected"));
                FileOutcome::Skipped {
                    path: path.to_path_buf(),
                    reason: "no destination folder selected".into(),
                }
            }
            Err(PipelineError::Cancelled) => {
                self.set_state(path, FileState::Skipped);
                FileOutcome::Skipped {
                    path: path.to_path_buf(),
                    reason: "cancelled".into(),
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(path = %path.display(), error = %message, "file failed");
                self.set_state(path, FileState::Failed);
                self.emit(PipelineEvent::Failed {
                    path: path.to_path_buf(),
                    error: message.clone(),
                });
                FileOutcome::Failed {
                    path: path.to_path_buf(),
                    error: message,
                }
            }
        }
    }

    async fn pipeline_file(
        &mut self,
        path: &Path,
        batch: &mut Batch,
    ) -> Result<FileOutcome, PipelineError> {
        self.set_state(path, FileState::Stabilizing);
        let watched = await_stable(WatchedFile::new(path), self.settings.stability, &self.cancel)
            .await
            .map_err(|e| match e {
                StabilityError::Cancelled => PipelineError::Cancelled,
                other => PipelineError::Stability(other),
            })?;
        debug!(
            path = %path.display(),
            size = watched.stable_size().unwrap_or(0),
            detected_at = %watched.detected_at,
            "ready for upload"
        );

        let path = match self.rename_step(path).await {
            Some(path) => path,
            None => {
                self.set_state(path, FileState::Skipped);
                return Ok(FileOutcome::Skipped {
                    path: path.to_path_buf(),
                    reason: "rename cancelled".into(),
                });
            }
        };
        let name = file_name(&path);

        self.set_state(&path, FileState::AwaitingDestination);
        let folder = self.resolve_folder(batch).await?;

        self.set_state(&path, FileState::Uploading);
        let object = loop {
            let uploader = Uploader::new(self.store.as_ref(), &self.settings.upload)
                .with_events(&self.events_tx);
            match uploader.upload(&path, &name, &folder.id).await {
                Ok(object) => break object,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        folder = %folder.name,
                        error = %e,
                        "upload attempt failed"
                    );
                    self.prompter
                        .notify(Notice::error("Upload failed", format!("{name}: {e}")));
                    let text = format!("Upload of {name} failed. Try again?");
                    if !self.prompter.ask_yes_no(Question::RetryUpload, &text).await {
                        return Err(e.into());
                    }
                }
            }
        };

        self.set_state(&path, FileState::Completed);
        self.emit(PipelineEvent::Uploaded {
            path: path.clone(),
            object: object.clone(),
        });
        let link = object.web_link.as_deref().unwrap_or("no link available");
        self.prompter.notify(Notice::info(
            "Upload complete",
            format!("{} uploaded to {}: {link}", object.name, folder.name),
        ));

        let text = format!("Delete local copy of {name}?");
        let cleanup = if self.prompter.ask_yes_no(Question::DeleteLocal, &text).await {
            let outcome = delete_with_retry(
                &path,
                self.settings.delete_max_attempts,
                self.settings.delete_base_delay,
            )
            .await;
            if !outcome.is_deleted() {
                self.prompter.notify(Notice::warning(
                    "Cleanup",
                    format!("{name} is still in use and was not deleted"),
                ));
            }
            self.emit(PipelineEvent::Cleanup {
                path: path.clone(),
                outcome: outcome.clone(),
            });
            Some(outcome)
        } else {
            debug!(path = %path.display(), "keeping local copy");
            None
        };

        Ok(FileOutcome::Uploaded {
            path,
            object,
            cleanup,
        })
    }

    /// Offers a rename. `None` means the user cancelled and the file is
    /// skipped. A blank answer keeps the current name instead of skipping
    /// the file, and a failed rename keeps the original path.
    async fn rename_step(&mut self, path: &Path) -> Option<PathBuf> {
        if !self.settings.prompt_rename {
            return Some(path.to_path_buf());
        }

        let current = file_name(path);
        let answer = self
            .prompter
            .ask_string(Field::NewName, "Name for the uploaded recording", &current)
            .await?;

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp4".into());
        let Some(new_name) = normalize_video_name(&answer, &extension) else {
            return Some(path.to_path_buf());
        };
        if new_name == current {
            return Some(path.to_path_buf());
        }

        match rename_in_place(path, &new_name) {
            Ok(renamed) => {
                self.mark_processed(&renamed);
                Some(renamed)
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    new_name = %new_name,
                    error = %e,
                    "rename failed, keeping original name"
                );
                Some(path.to_path_buf())
            }
        }
    }

    async fn resolve_folder(&self, batch: &mut Batch) -> Result<RemoteFolder, PipelineError> {
        if let Some(folder) = batch.folder() {
            debug!(folder = %folder.name, "reusing batch destination");
            return Ok(folder.clone());
        }

        let folders = list_folders_with_retry(self.store.as_ref(), self.prompter.as_ref()).await;
        let resolver = DestinationResolver::new(self.prompter.as_ref(), self.settings.confirm_timeout);
        match resolver.resolve(&folders, &self.settings.folder_hint()).await {
            DestinationChoice::Folder(folder) => {
                batch.remember(&folder);
                Ok(folder)
            }
            DestinationChoice::Declined => Err(PipelineError::Declined),
        }
    }

    fn set_state(&self, path: &Path, state: FileState) {
        debug!(path = %path.display(), ?state, "file state");
        self.emit(PipelineEvent::StateChanged {
            path: path.to_path_buf(),
            state,
        });
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events_tx.try_send(event);
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
