//! [`ObjectStore`] implementation on top of the Drive client.

use std::path::Path;

use tracing::{debug, warn};
use vidrelay_drive::{ChunkResponse, Client, DriveFile, UploadRequest};
use vidrelay_pipeline::{
    BoxFuture, ChunkProgress, ObjectStore, RemoteFolder, RemoteObject, ResumableUpload, StoreError,
};
use vidrelay_transfer::{ChunkReader, aligned_chunk_size};

/// Google Drive as an object store.
pub struct DriveStore {
    client: Client,
    chunk_size: usize,
}

impl DriveStore {
    /// Chunk size is rounded up to the 256 KiB multiple Drive requires.
    pub fn new(client: Client, chunk_size: usize) -> Self {
        Self {
            client,
            chunk_size: aligned_chunk_size(chunk_size),
        }
    }
}

fn store_error(e: vidrelay_drive::Error) -> StoreError {
    StoreError::Remote {
        transient: e.is_transient(),
        message: e.to_string(),
    }
}

fn remote_object(file: DriveFile) -> RemoteObject {
    RemoteObject {
        id: file.id,
        name: file.name,
        web_link: file.web_view_link,
        sha256: file.sha256_checksum,
    }
}

impl ObjectStore for DriveStore {
    fn label(&self) -> &str {
        "drive"
    }

    fn list_folders(&self) -> BoxFuture<'_, Result<Vec<RemoteFolder>, StoreError>> {
        Box::pin(async move {
            let files = self.client.list_folders().await.map_err(store_error)?;
            Ok(files
                .into_iter()
                .map(|f| RemoteFolder::new(f.id, f.name))
                .collect())
        })
    }

    fn create_resumable_upload<'a>(
        &'a self,
        name: &'a str,
        parent_id: &'a str,
        local_path: &'a Path,
    ) -> BoxFuture<'a, Result<Box<dyn ResumableUpload>, StoreError>> {
        Box::pin(async move {
            let reader = ChunkReader::new(local_path, self.chunk_size)?;
            let total = reader.file_size();
            let session_uri = self
                .client
                .start_resumable_upload(&UploadRequest::new(name, parent_id, total))
                .await
                .map_err(store_error)?;

            let upload: Box<dyn ResumableUpload> = Box::new(DriveUpload {
                client: self.client.clone(),
                session_uri,
                reader: Some(reader),
                acknowledged: 0,
                total,
                resync: false,
            });
            Ok(upload)
        })
    }
}

/// One Drive resumable session.
struct DriveUpload {
    client: Client,
    session_uri: String,
    // Taken while a chunk is read on the blocking pool.
    reader: Option<ChunkReader>,
    acknowledged: u64,
    total: u64,
    /// Set after a failed PUT: the server's offset must be queried before
    /// sending again.
    resync: bool,
}

impl DriveUpload {
    async fn read_chunk(&mut self, offset: u64) -> Result<Vec<u8>, StoreError> {
        let mut reader = self.reader.take().ok_or_else(|| StoreError::Remote {
            message: "chunk reader unavailable".into(),
            transient: false,
        })?;

        let (reader, chunk) = tokio::task::spawn_blocking(move || {
            let chunk = reader.seek_to(offset).and_then(|_| reader.next_chunk());
            (reader, chunk)
        })
        .await
        .map_err(|e| StoreError::Remote {
            message: format!("task join error: {e}"),
            transient: false,
        })?;
        self.reader = Some(reader);

        Ok(chunk?.map(|c| c.data).unwrap_or_default())
    }

    fn accept(&mut self, response: ChunkResponse) -> ChunkProgress {
        match response {
            ChunkResponse::Incomplete { next_offset } => {
                self.acknowledged = next_offset.min(self.total);
                ChunkProgress::Progress {
                    bytes_sent: self.acknowledged,
                    bytes_total: self.total,
                }
            }
            ChunkResponse::Complete(file) => {
                self.acknowledged = self.total;
                ChunkProgress::Done(remote_object(file))
            }
        }
    }
}

impl ResumableUpload for DriveUpload {
    fn send_next_chunk(&mut self) -> BoxFuture<'_, Result<ChunkProgress, StoreError>> {
        Box::pin(async move {
            if self.resync {
                let status = self
                    .client
                    .query_upload_status(&self.session_uri, self.total)
                    .await
                    .map_err(store_error)?;
                self.resync = false;
                let progress = self.accept(status);
                debug!(offset = self.acknowledged, "resumed drive session");
                if matches!(progress, ChunkProgress::Done(_)) {
                    return Ok(progress);
                }
            }

            let offset = self.acknowledged;
            let data = self.read_chunk(offset).await?;
            match self
                .client
                .upload_chunk(&self.session_uri, offset, data, self.total)
                .await
            {
                Ok(response) => Ok(self.accept(response)),
                Err(e) => {
                    warn!(offset, total = self.total, error = %e, "drive chunk failed");
                    self.resync = true;
                    Err(store_error(e))
                }
            }
        })
    }
}
