//! Directory-backed object store.
//!
//! Each immediate subdirectory of the root is a folder; uploads are copied
//! chunk by chunk into a hidden partial file and renamed into place when the
//! last chunk lands.

use std::path::{Path, PathBuf};

use tracing::debug;
use vidrelay_transfer::{ChunkReader, ChunkWriter, calculate_file_checksum, validate_object_name};

use super::{ChunkProgress, ObjectStore, ResumableUpload};
use crate::BoxFuture;
use crate::error::StoreError;
use crate::types::{RemoteFolder, RemoteObject};

/// Object store backed by a local (or mounted network) directory.
#[derive(Debug, Clone)]
pub struct LocalFolderStore {
    root: PathBuf,
    chunk_size: usize,
    label: String,
}

impl LocalFolderStore {
    pub fn new(root: impl Into<PathBuf>, chunk_size: usize) -> Self {
        let root = root.into();
        let label = format!("local:{}", root.display());
        Self {
            root,
            chunk_size,
            label,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_folders(&self) -> Result<Vec<RemoteFolder>, StoreError> {
        let mut folders = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            folders.push(RemoteFolder::new(name.clone(), name));
        }
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(folders)
    }
}

impl ObjectStore for LocalFolderStore {
    fn label(&self) -> &str {
        &self.label
    }

    fn list_folders(&self) -> BoxFuture<'_, Result<Vec<RemoteFolder>, StoreError>> {
        Box::pin(async move { self.read_folders() })
    }

    fn create_resumable_upload<'a>(
        &'a self,
        name: &'a str,
        parent_id: &'a str,
        local_path: &'a Path,
    ) -> BoxFuture<'a, Result<Box<dyn ResumableUpload>, StoreError>> {
        Box::pin(async move {
            validate_object_name(name)?;
            validate_object_name(parent_id)
                .map_err(|_| StoreError::FolderNotFound(parent_id.to_string()))?;

            let folder = self.root.join(parent_id);
            if !folder.is_dir() {
                return Err(StoreError::FolderNotFound(parent_id.to_string()));
            }

            let reader = ChunkReader::new(local_path, self.chunk_size)?;
            let partial = folder.join(format!(".{name}.partial"));
            let _ = std::fs::remove_file(&partial);

            debug!(
                source = %local_path.display(),
                folder = %folder.display(),
                size = reader.file_size(),
                "opened local upload"
            );

            let upload: Box<dyn ResumableUpload> = Box::new(LocalUpload {
                state: Some(LocalUploadState {
                    total: reader.file_size(),
                    reader,
                    writer: ChunkWriter::new(&partial),
                    acknowledged: 0,
                }),
                folder,
                name: name.to_string(),
            });
            Ok(upload)
        })
    }
}

struct LocalUploadState {
    reader: ChunkReader,
    writer: ChunkWriter,
    acknowledged: u64,
    total: u64,
}

struct LocalUpload {
    // Taken while a chunk is copied on the blocking pool.
    state: Option<LocalUploadState>,
    folder: PathBuf,
    name: String,
}

impl LocalUploadState {
    /// Copies one chunk; returns `true` once every byte is written.
    fn copy_chunk(&mut self) -> Result<bool, StoreError> {
        self.reader.seek_to(self.acknowledged)?;
        match self.reader.next_chunk()? {
            Some(chunk) => {
                self.writer.write_chunk(&chunk)?;
                self.acknowledged = chunk.offset + chunk.data.len() as u64;
            }
            None if self.total == 0 => {
                std::fs::File::create(self.writer.path())?;
            }
            None => {}
        }
        Ok(self.acknowledged >= self.total)
    }
}

impl ResumableUpload for LocalUpload {
    fn send_next_chunk(&mut self) -> BoxFuture<'_, Result<ChunkProgress, StoreError>> {
        Box::pin(async move {
            let mut state = self.state.take().ok_or_else(|| StoreError::Remote {
                message: "upload session already finished".into(),
                transient: false,
            })?;

            let (state, result) = tokio::task::spawn_blocking(move || {
                let result = state.copy_chunk();
                (state, result)
            })
            .await
            .map_err(|e| StoreError::Remote {
                message: format!("task join error: {e}"),
                transient: false,
            })?;

            let finished = match result {
                Ok(finished) => finished,
                Err(e) => {
                    self.state = Some(state);
                    return Err(e);
                }
            };

            if !finished {
                let progress = ChunkProgress::Progress {
                    bytes_sent: state.acknowledged,
                    bytes_total: state.total,
                };
                self.state = Some(state);
                return Ok(progress);
            }

            let partial = state.writer.path().to_path_buf();
            let folder = self.folder.clone();
            let name = self.name.clone();
            let object = tokio::task::spawn_blocking(move || finalize(&partial, &folder, &name))
                .await
                .map_err(|e| StoreError::Remote {
                    message: format!("task join error: {e}"),
                    transient: false,
                })??;
            Ok(ChunkProgress::Done(object))
        })
    }
}

fn finalize(partial: &Path, folder: &Path, name: &str) -> Result<RemoteObject, StoreError> {
    let id = uuid::Uuid::new_v4().to_string();
    let mut target = folder.join(name);
    if target.exists() {
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = Path::new(name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        target = folder.join(format!("{stem}-{}{suffix}", &id[..8]));
    }

    std::fs::rename(partial, &target)?;
    let sha256 = calculate_file_checksum(&target)?;

    Ok(RemoteObject {
        id,
        name: target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        web_link: Some(format!("file://{}", target.display())),
        sha256: Some(sha256),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store_with_folders(names: &[&str]) -> (TempDir, LocalFolderStore) {
        let dir = TempDir::new().unwrap();
        for name in names {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("stray.txt"), b"not a folder").unwrap();
        let store = LocalFolderStore::new(dir.path(), 4);
        (dir, store)
    }

    #[tokio::test]
    async fn lists_subdirectories_sorted() {
        let (_dir, store) = store_with_folders(&["Unit 8", "APStat Unit7", ".trash"]);
        let folders = store.list_folders().await.unwrap();
        let names: Vec<&str> = folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["APStat Unit7", "Unit 8"]);
        assert!(store.label().starts_with("local:"));
    }

    #[tokio::test]
    async fn uploads_in_chunks() {
        let (dir, store) = store_with_folders(&["dest"]);
        let src_dir = TempDir::new().unwrap();
        let src = src_dir.path().join("clip.mp4");
        fs::write(&src, b"0123456789").unwrap();

        let mut upload = store
            .create_resumable_upload("clip.mp4", "dest", &src)
            .await
            .unwrap();

        let mut progress = Vec::new();
        let object = loop {
            match upload.send_next_chunk().await.unwrap() {
                ChunkProgress::Progress { bytes_sent, bytes_total } => {
                    assert_eq!(bytes_total, 10);
                    progress.push(bytes_sent);
                }
                ChunkProgress::Done(object) => break object,
            }
        };

        assert_eq!(progress, vec![4, 8]);
        assert_eq!(object.name, "clip.mp4");
        assert!(!object.id.is_empty());
        assert_eq!(
            object.sha256.as_deref(),
            Some(vidrelay_transfer::checksum_bytes(b"0123456789").as_str())
        );
        assert_eq!(fs::read(dir.path().join("dest/clip.mp4")).unwrap(), b"0123456789");
        assert!(!dir.path().join("dest/.clip.mp4.partial").exists());

        // The session is spent.
        assert!(upload.send_next_chunk().await.is_err());
    }

    #[tokio::test]
    async fn empty_file_completes_immediately() {
        let (dir, store) = store_with_folders(&["dest"]);
        let src = dir.path().join("empty.mp4");
        fs::write(&src, b"").unwrap();

        let mut upload = store
            .create_resumable_upload("empty.mp4", "dest", &src)
            .await
            .unwrap();
        let result = upload.send_next_chunk().await.unwrap();
        assert!(matches!(result, ChunkProgress::Done(_)));
        assert!(dir.path().join("dest/empty.mp4").exists());
    }

    #[tokio::test]
    async fn existing_name_gets_unique_target() {
        let (dir, store) = store_with_folders(&["dest"]);
        fs::write(dir.path().join("dest/clip.mp4"), b"old").unwrap();
        let src = dir.path().join("new.mp4");
        fs::write(&src, b"new").unwrap();

        let mut upload = store
            .create_resumable_upload("clip.mp4", "dest", &src)
            .await
            .unwrap();
        let ChunkProgress::Done(object) = upload.send_next_chunk().await.unwrap() else {
            panic!("expected single-chunk upload to finish");
        };
        assert_ne!(object.name, "clip.mp4");
        assert!(object.name.starts_with("clip-"));
        assert_eq!(fs::read(dir.path().join("dest/clip.mp4")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn unknown_folder_rejected() {
        let (dir, store) = store_with_folders(&["dest"]);
        let src = dir.path().join("a.mp4");
        fs::write(&src, b"a").unwrap();

        for parent in ["missing", "../dest", "stray.txt"] {
            let result = store.create_resumable_upload("a.mp4", parent, &src).await;
            assert!(
                matches!(result, Err(StoreError::FolderNotFound(_))),
                "parent {parent} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn missing_source_fails() {
        let (dir, store) = store_with_folders(&["dest"]);
        let result = store
            .create_resumable_upload("a.mp4", "dest", &dir.path().join("nope.mp4"))
            .await;
        assert!(matches!(result, Err(StoreError::Transfer(_))));
    }
}
