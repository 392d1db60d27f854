use serde::{Deserialize, Serialize};

/// File or folder metadata as returned by Drive.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub sha256_checksum: Option<String>,
}

/// One page of `files.list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Metadata body for starting a resumable upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadRequest {
    pub name: String,
    pub parents: Vec<String>,
    #[serde(skip)]
    pub mime_type: String,
    #[serde(skip)]
    pub size: u64,
}

impl UploadRequest {
    pub fn new(name: impl Into<String>, parent_id: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            parents: vec![parent_id.into()],
            mime_type: "video/mp4".into(),
            size,
        }
    }
}

/// Server answer to a chunk PUT or a status query.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkResponse {
    /// `308 Resume Incomplete`: the server holds bytes `[0, next_offset)`.
    Incomplete { next_offset: u64 },
    /// `200`/`201`: the upload is finished.
    Complete(DriveFile),
}
