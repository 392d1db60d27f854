//! Single-file upload through a resumable store session.

use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vidrelay_transfer::{ProgressGate, SpeedCalculator, UploadTask, calculate_file_checksum};

use crate::error::{StoreError, UploadError};
use crate::store::{ChunkProgress, ObjectStore};
use crate::types::{PipelineEvent, RemoteObject};

/// Consecutive progress reports without new bytes before giving up.
const STALL_LIMIT: u32 = 16;

/// Upload tuning.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Progress reporting step in percentage points.
    pub progress_step: u8,
    /// Extra attempts per chunk after a transient error. Zero makes every
    /// chunk error fatal.
    pub chunk_retries: u32,
    /// Base delay between chunk attempts; attempt `n` waits `n * delay`.
    pub chunk_retry_delay: Duration,
    /// Compare the local SHA-256 with the one the store reports.
    pub verify_checksum: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            progress_step: 10,
            chunk_retries: 0,
            chunk_retry_delay: Duration::from_secs(2),
            verify_checksum: true,
        }
    }
}

/// Drives one upload from session creation to the final descriptor.
pub struct Uploader<'a> {
    store: &'a dyn ObjectStore,
    options: &'a UploadOptions,
    events: Option<&'a mpsc::Sender<PipelineEvent>>,
}

impl<'a> Uploader<'a> {
    pub fn new(store: &'a dyn ObjectStore, options: &'a UploadOptions) -> Self {
        Self {
            store,
            options,
            events: None,
        }
    }

    /// Emits coarse progress events on `events`. Events are dropped when the
    /// channel is full.
    pub fn with_events(mut self, events: &'a mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Uploads `path` as `target_name` into `folder_id`.
    ///
    /// Succeeds only when the store returns a descriptor with a non-empty id.
    /// The local file is never touched.
    pub async fn upload(
        &self,
        path: &Path,
        target_name: &str,
        folder_id: &str,
    ) -> Result<RemoteObject, UploadError> {
        let total = tokio::fs::metadata(path)
            .await
            .map_err(|source| UploadError::Local {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        let mut task = UploadTask::new(path, target_name, folder_id, total);
        task.start()?;
        info!(
            path = %path.display(),
            name = target_name,
            folder = folder_id,
            store = self.store.label(),
            bytes = total,
            "starting upload"
        );

        let mut session = match self
            .store
            .create_resumable_upload(target_name, folder_id, path)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                task.fail(&e.to_string());
                return Err(UploadError::Start(e));
            }
        };

        let mut gate = ProgressGate::new(self.options.progress_step);
        let mut speed = SpeedCalculator::default();
        speed.add_sample(0);
        let mut stalled = 0u32;
        let mut attempt = 0u32;

        loop {
            match session.send_next_chunk().await {
                Ok(ChunkProgress::Progress { bytes_sent, bytes_total }) => {
                    attempt = 0;
                    if bytes_total != total {
                        debug!(path = %path.display(), local = total, remote = bytes_total, "size mismatch in progress report");
                    }

                    let before = task.bytes_sent();
                    let now = task.advance(bytes_sent)?;
                    if now > before {
                        stalled = 0;
                        speed.add_sample(now - before);
                    } else {
                        stalled += 1;
                        if stalled >= STALL_LIMIT {
                            let err = UploadError::Stalled(stalled);
                            task.fail(&err.to_string());
                            warn!(path = %path.display(), bytes_sent = now, bytes_total = total, "upload stalled");
                            return Err(err);
                        }
                    }

                    if let Some(percent) = gate.observe(task.fraction()) {
                        self.report(path, percent, &task, speed.bytes_per_second());
                    }
                }
                Ok(ChunkProgress::Done(object)) => {
                    if object.id.is_empty() {
                        task.fail("store returned an empty object id");
                        return Err(UploadError::MissingObjectId);
                    }
                    if let Err(e) = self.verify(path, &object).await {
                        task.fail(&e.to_string());
                        return Err(e);
                    }

                    task.complete()?;
                    if let Some(percent) = gate.observe(1.0) {
                        self.report(path, percent, &task, speed.bytes_per_second());
                    }
                    info!(
                        path = %path.display(),
                        id = %object.id,
                        name = %object.name,
                        elapsed_ms = task.elapsed().map(|d| d.as_millis() as u64).unwrap_or(0),
                        "upload complete"
                    );
                    return Ok(object);
                }
                Err(e) if e.is_transient() && attempt < self.options.chunk_retries => {
                    attempt += 1;
                    let delay = self.options.chunk_retry_delay * attempt;
                    warn!(
                        path = %path.display(),
                        bytes_sent = task.bytes_sent(),
                        bytes_total = total,
                        attempt,
                        error = %e,
                        "chunk failed, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(self.chunk_failed(&mut task, e)),
            }
        }
    }

    fn chunk_failed(&self, task: &mut UploadTask, source: StoreError) -> UploadError {
        task.fail(&source.to_string());
        warn!(
            path = %task.source_path().display(),
            folder = task.folder_id(),
            bytes_sent = task.bytes_sent(),
            bytes_total = task.bytes_total(),
            error = %source,
            "upload failed"
        );
        UploadError::Chunk {
            bytes_sent: task.bytes_sent(),
            bytes_total: task.bytes_total(),
            source,
        }
    }

    async fn verify(&self, path: &Path, object: &RemoteObject) -> Result<(), UploadError> {
        let Some(remote) = object.sha256.as_deref().filter(|_| self.options.verify_checksum) else {
            return Ok(());
        };

        let local_path = path.to_path_buf();
        let local = tokio::task::spawn_blocking(move || calculate_file_checksum(&local_path))
            .await
            .map_err(|e| UploadError::Local {
                path: path.to_path_buf(),
                source: std::io::Error::other(e),
            })??;

        if !local.eq_ignore_ascii_case(remote) {
            return Err(UploadError::ChecksumMismatch {
                local,
                remote: remote.to_string(),
            });
        }
        debug!(path = %path.display(), sha256 = %local, "checksum verified");
        Ok(())
    }

    fn report(&self, path: &Path, percent: u8, task: &UploadTask, bytes_per_second: f64) {
        info!(
            path = %path.display(),
            percent,
            bytes_sent = task.bytes_sent(),
            bytes_total = task.bytes_total(),
            "upload progress"
        );
        if let Some(events) = self.events {
            let _ = events.try_send(PipelineEvent::Progress {
                path: path.to_path_buf(),
                percent,
                bytes_sent: task.bytes_sent(),
                bytes_total: task.bytes_total(),
                bytes_per_second,
            });
        }
    }
}
