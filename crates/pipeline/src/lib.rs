//! Watch-folder upload pipeline.
//!
//! This crate implements the **business logic** for getting recordings from
//! a local folder into a remote object store. It has no UI or transport
//! dependencies: the application supplies an [`ObjectStore`] and a
//! [`Prompter`] implementation.
//!
//! # Pipeline
//!
//! 1. **Detect**: a creation event names a video file
//! 2. **Stabilize**: wait until the file stops growing
//! 3. **Rename**: optionally let the user pick a new name
//! 4. **Resolve**: match the watch folder name against remote folders
//! 5. **Upload**: send chunks through a resumable session
//! 6. **Clean up**: delete the local copy if the user opts in

pub mod coordinator;
pub mod error;
pub mod prompt;
pub mod resolver;
pub mod store;
pub mod types;
pub mod upload;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_support;

use std::future::Future;
use std::pin::Pin;

pub use coordinator::{Batch, Pipeline};
pub use error::{PipelineError, StoreError, UploadError};
pub use prompt::{AutoAnswers, AutoPrompter, Confirmation, Field, Notice, NoticeLevel, Prompter, Question};
pub use resolver::{DestinationResolver, find_match, list_folders_with_retry};
pub use store::{ChunkProgress, LocalFolderStore, ObjectStore, ResumableUpload};
pub use types::{
    BacklogOutcome, DestinationChoice, FileOutcome, FileState, PipelineEvent, PipelineSettings,
    RemoteFolder, RemoteObject, RunSummary,
};
pub use upload::{UploadOptions, Uploader};
pub use watcher::{DirectoryWatcher, watch_directory};

/// Boxed future returned by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
