use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::task::Chunk;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a local file in fixed-size chunks.
///
/// The file size is captured when the reader is opened; the pipeline only
/// opens readers on files that have already stopped growing.
#[derive(Debug)]
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: usize,
    offset: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub fn new(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            file_size,
        })
    }

    /// Seeks to the given byte offset.
    ///
    /// Stores call this with the last offset the remote side acknowledged,
    /// so a failed chunk is re-read rather than skipped.
    pub fn seek_to(&mut self, offset: u64) -> Result<(), TransferError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }

    /// Reads the next chunk. Returns `None` at EOF.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; read_size];
        self.file.read_exact(&mut buf)?;

        let chunk = Chunk {
            offset: self.offset,
            checksum: checksum_bytes(&buf),
            data: buf,
        };
        self.offset += read_size as u64;
        Ok(Some(chunk))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.offset)
    }

    /// Configured chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

// ---------------------------------------------------------------------------
// ChunkWriter
// ---------------------------------------------------------------------------

/// Writes chunks into a single target file at exact offsets.
#[derive(Debug)]
pub struct ChunkWriter {
    path: PathBuf,
    written: u64,
}

impl ChunkWriter {
    /// Creates a writer for `path`. The file is created on the first write.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            written: 0,
        }
    }

    /// Writes a chunk to disk.
    ///
    /// Verifies the checksum if non-empty and creates parent directories as
    /// needed. Rewriting an already written range is allowed.
    pub fn write_chunk(&mut self, chunk: &Chunk) -> Result<(), TransferError> {
        if !chunk.checksum.is_empty() && checksum_bytes(&chunk.data) != chunk.checksum {
            return Err(TransferError::ChecksumMismatch);
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;
        file.seek(SeekFrom::Start(chunk.offset))?;
        file.write_all(&chunk.data)?;

        self.written = self.written.max(chunk.offset + chunk.data.len() as u64);
        Ok(())
    }

    /// Returns the highest byte offset written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Returns the target path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
