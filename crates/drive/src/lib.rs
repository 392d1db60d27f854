//! Google Drive v3 client for the upload pipeline.
//!
//! Covers the two things the pipeline needs from Drive: listing folders and
//! the [resumable upload protocol](https://developers.google.com/drive/api/guides/manage-uploads#resumable).
//! Obtaining the OAuth access token is the caller's business.

pub mod client;
pub mod types;

pub use client::{Client, Error};
pub use types::{ChunkResponse, DriveFile, UploadRequest};
