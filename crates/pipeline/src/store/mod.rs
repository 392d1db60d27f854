//! Object store abstraction.
//!
//! The application implements [`ObjectStore`] on top of a real storage API.
//! Using a trait keeps pipeline logic decoupled from transport and testable
//! with mocks.

mod local;

use std::path::Path;

pub use local::LocalFolderStore;

use crate::BoxFuture;
use crate::error::StoreError;
use crate::types::{RemoteFolder, RemoteObject};

/// Result of one chunk send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkProgress {
    /// The store holds `bytes_sent` of `bytes_total` bytes.
    Progress { bytes_sent: u64, bytes_total: u64 },
    /// The upload is finished.
    Done(RemoteObject),
}

/// Abstract remote object store.
///
/// One instance is created at startup and shared read-only by every file in
/// the run.
pub trait ObjectStore: Send + Sync {
    /// Short label for logs.
    fn label(&self) -> &str;

    /// Lists candidate destination folders in the store's natural order.
    fn list_folders(&self) -> BoxFuture<'_, Result<Vec<RemoteFolder>, StoreError>>;

    /// Opens a resumable upload of `local_path` as `name` inside `parent_id`.
    fn create_resumable_upload<'a>(
        &'a self,
        name: &'a str,
        parent_id: &'a str,
        local_path: &'a Path,
    ) -> BoxFuture<'a, Result<Box<dyn ResumableUpload>, StoreError>>;
}

/// An open resumable upload session.
///
/// After a failed call, the next call must resume from the last offset the
/// store acknowledged.
pub trait ResumableUpload: Send {
    fn send_next_chunk(&mut self) -> BoxFuture<'_, Result<ChunkProgress, StoreError>>;
}
