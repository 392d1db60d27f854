//! Chunked file transfer primitives shared by the object stores and the
//! upload pipeline.
//!
//! Nothing here talks to the network: stores use [`ChunkReader`] and
//! [`ChunkWriter`] to move bytes, the pipeline uses [`UploadTask`] and
//! [`ProgressGate`] to account for them.

mod chunked;
mod progress;
mod task;
mod validation;

pub use chunked::{ChunkReader, ChunkWriter, calculate_file_checksum, checksum_bytes};
pub use progress::{ProgressGate, SpeedCalculator};
pub use task::{Chunk, UploadState, UploadTask};
pub use validation::validate_object_name;

/// Default chunk size: 8 MiB.
///
/// A multiple of 256 KiB, which resumable upload endpoints require for every
/// chunk except the last.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Chunk alignment required by resumable upload endpoints.
pub const CHUNK_ALIGNMENT: usize = 256 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid object name: {0}")]
    InvalidName(String),

    #[error("invalid upload transition: {from:?} -> {to:?}")]
    InvalidTransition { from: UploadState, to: UploadState },
}

/// Rounds `size` up to the next multiple of [`CHUNK_ALIGNMENT`].
///
/// Zero maps to [`DEFAULT_CHUNK_SIZE`].
pub fn aligned_chunk_size(size: usize) -> usize {
    if size == 0 {
        return DEFAULT_CHUNK_SIZE;
    }
    size.div_ceil(CHUNK_ALIGNMENT) * CHUNK_ALIGNMENT
}
