//! Drive REST client.
//!
//! Async HTTP client using `reqwest` with Bearer token authentication.

use reqwest::StatusCode;
use reqwest::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderMap, HeaderValue, LOCATION,
    RANGE,
};
use tracing::debug;

use crate::types::{ChunkResponse, DriveFile, FileList, UploadRequest};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const UPLOAD_FIELDS: &str = "id,name,webViewLink,sha256Checksum";
const PAGE_SIZE: &str = "1000";

/// Errors from the Drive client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid access token")]
    InvalidToken,

    #[error("upload session response had no Location header")]
    MissingSessionUri,

    #[error("malformed Range header: {0}")]
    InvalidRange(String),
}

impl Error {
    /// `true` for failures worth retrying: rate limiting, server errors,
    /// timeouts and dropped connections.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Api { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

/// Drive v3 API client.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Creates a new client with the given OAuth access token.
    pub fn new(access_token: &str) -> Result<Self, Error> {
        let token = access_token.trim();
        if token.is_empty() {
            return Err(Error::InvalidToken);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| Error::InvalidToken)?,
        );

        // 308 means "resume incomplete" here, never a redirect to follow.
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Sets a custom base URL (for testing).
    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Lists all non-trashed folders visible to the token, in server order.
    pub async fn list_folders(&self) -> Result<Vec<DriveFile>, Error> {
        let url = format!("{}/drive/v3/files", self.base_url);
        let query = format!("mimeType='{FOLDER_MIME_TYPE}' and trashed=false");
        let mut folders = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.clone()),
                ("fields", "nextPageToken,files(id,name)".to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let resp = self.http.get(&url).query(&params).send().await?;
            let body = check_status(resp).await?.bytes().await?;
            let page: FileList = serde_json::from_slice(&body)?;
            folders.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(count = folders.len(), "listed drive folders");
        Ok(folders)
    }

    /// Starts a resumable upload session and returns its session URI.
    pub async fn start_resumable_upload(&self, request: &UploadRequest) -> Result<String, Error> {
        let url = format!("{}/upload/drive/v3/files", self.base_url);
        let resp = self
            .http
            .post(&url)
            .query(&[("uploadType", "resumable"), ("fields", UPLOAD_FIELDS)])
            .header("X-Upload-Content-Type", &request.mime_type)
            .header("X-Upload-Content-Length", request.size.to_string())
            .json(request)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(Error::MissingSessionUri)?
            .to_string();

        debug!(name = %request.name, size = request.size, "started resumable upload");
        Ok(location)
    }

    /// Sends bytes `[offset, offset + data.len())` of a `total`-byte upload.
    pub async fn upload_chunk(
        &self,
        session_uri: &str,
        offset: u64,
        data: Vec<u8>,
        total: u64,
    ) -> Result<ChunkResponse, Error> {
        let range = if data.is_empty() {
            format!("bytes */{total}")
        } else {
            format!("bytes {}-{}/{total}", offset, offset + data.len() as u64 - 1)
        };

        let resp = self
            .http
            .put(session_uri)
            .header(CONTENT_RANGE, range)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;
        parse_chunk_response(resp).await
    }

    /// Asks the server how many bytes of the session it holds.
    pub async fn query_upload_status(
        &self,
        session_uri: &str,
        total: u64,
    ) -> Result<ChunkResponse, Error> {
        let resp = self
            .http
            .put(session_uri)
            .header(CONTENT_RANGE, format!("bytes */{total}"))
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;
        parse_chunk_response(resp).await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}

async fn parse_chunk_response(resp: reqwest::Response) -> Result<ChunkResponse, Error> {
    if resp.status() == StatusCode::PERMANENT_REDIRECT {
        let next_offset = match resp.headers().get(RANGE) {
            Some(value) => {
                let text = value
                    .to_str()
                    .map_err(|_| Error::InvalidRange("non-ASCII".into()))?;
                parse_range_end(text)? + 1
            }
            None => 0,
        };
        return Ok(ChunkResponse::Incomplete { next_offset });
    }

    let body = check_status(resp).await?.bytes().await?;
    let file: DriveFile = serde_json::from_slice(&body)?;
    Ok(ChunkResponse::Complete(file))
}

/// Parses the inclusive end of `bytes=0-N`.
fn parse_range_end(header: &str) -> Result<u64, Error> {
    header
        .strip_prefix("bytes=")
        .and_then(|r| r.split_once('-'))
        .and_then(|(_, end)| end.trim().parse::<u64>().ok())
        .ok_or_else(|| Error::InvalidRange(header.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Reads one HTTP request (headers plus Content-Length body).
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Starts a mock HTTP server that answers consecutive connections with
    /// the given raw responses and hands back the requests it saw.
    async fn mock_sequence(
        responses: Vec<String>,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");

        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for resp in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                requests.push(read_request(&mut stream).await);
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
            requests
        });

        (url, handle)
    }

    fn response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut resp = format!("HTTP/1.1 {status}\r\n");
        for (name, value) in headers {
            resp.push_str(&format!("{name}: {value}\r\n"));
        }
        resp.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ));
        resp
    }

    fn json_ok(body: &str) -> String {
        response("200 OK", &[("Content-Type", "application/json")], body)
    }

    #[test]
    fn empty_token_rejected() {
        assert!(matches!(Client::new("  "), Err(Error::InvalidToken)));
    }

    #[test]
    fn range_end_parsing() {
        assert_eq!(parse_range_end("bytes=0-262143").unwrap(), 262_143);
        assert!(parse_range_end("0-10").is_err());
        assert!(parse_range_end("bytes=0-").is_err());
    }

    #[test]
    fn transient_classification() {
        let rate = Error::Api {
            status: 429,
            body: String::new(),
        };
        let server = Error::Api {
            status: 503,
            body: String::new(),
        };
        let auth = Error::Api {
            status: 401,
            body: String::new(),
        };
        assert!(rate.is_transient());
        assert!(server.is_transient());
        assert!(!auth.is_transient());
        assert!(!Error::MissingSessionUri.is_transient());
    }

    #[tokio::test]
    async fn list_folders_follows_pages_in_order() {
        let (url, handle) = mock_sequence(vec![
            json_ok(
                r#"{"nextPageToken":"p2","files":[{"id":"1","name":"APStat Unit7"},{"id":"2","name":"Misc"}]}"#,
            ),
            json_ok(r#"{"files":[{"id":"3","name":"apstat unit7 extra"}]}"#),
        ])
        .await;

        let client = Client::new("token").unwrap().with_base_url(url);
        let folders = client.list_folders().await.unwrap();

        let ids: Vec<&str> = folders.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);

        let requests = handle.await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].starts_with("GET /drive/v3/files?"));
        assert!(requests[0].contains("trashed%3Dfalse"));
        assert!(requests[0].to_lowercase().contains("authorization: bearer token"));
        assert!(requests[1].contains("pageToken=p2"));
    }

    #[tokio::test]
    async fn list_folders_api_error() {
        let (url, handle) = mock_sequence(vec![response(
            "401 Unauthorized",
            &[],
            r#"{"error":"invalid_credentials"}"#,
        )])
        .await;

        let client = Client::new("expired").unwrap().with_base_url(url);
        let err = client.list_folders().await.unwrap_err();
        match err {
            Error::Api { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("invalid_credentials"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        handle.abort();
    }

    #[tokio::test]
    async fn start_upload_returns_location() {
        let (url, handle) = mock_sequence(vec![response(
            "200 OK",
            &[("Location", "https://upload.example/session/xyz")],
            "",
        )])
        .await;

        let client = Client::new("token").unwrap().with_base_url(url);
        let uri = client
            .start_resumable_upload(&UploadRequest::new("clip1.mp4", "folder-1", 1024))
            .await
            .unwrap();
        assert_eq!(uri, "https://upload.example/session/xyz");

        let requests = handle.await.unwrap();
        let req = &requests[0];
        assert!(req.starts_with("POST /upload/drive/v3/files?uploadType=resumable"));
        assert!(req.to_lowercase().contains("x-upload-content-length: 1024"));
        assert!(req.contains(r#""parents":["folder-1"]"#));
    }

    #[tokio::test]
    async fn start_upload_without_location_fails() {
        let (url, handle) = mock_sequence(vec![json_ok("{}")]).await;
        let client = Client::new("token").unwrap().with_base_url(url);
        let err = client
            .start_resumable_upload(&UploadRequest::new("clip.mp4", "f", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingSessionUri));
        handle.abort();
    }

    #[tokio::test]
    async fn chunk_incomplete_reports_next_offset() {
        let (url, handle) = mock_sequence(vec![response(
            "308 Resume Incomplete",
            &[("Range", "bytes=0-3")],
            "",
        )])
        .await;

        let client = Client::new("token").unwrap();
        let session = format!("{url}/session/1");
        let resp = client
            .upload_chunk(&session, 0, b"ABCD".to_vec(), 10)
            .await
            .unwrap();
        assert_eq!(resp, ChunkResponse::Incomplete { next_offset: 4 });

        let requests = handle.await.unwrap();
        assert!(requests[0].starts_with("PUT /session/1"));
        assert!(requests[0].to_lowercase().contains("content-range: bytes 0-3/10"));
        assert!(requests[0].ends_with("ABCD"));
    }

    #[tokio::test]
    async fn chunk_complete_returns_file() {
        let (url, handle) = mock_sequence(vec![response(
            "201 Created",
            &[("Content-Type", "application/json")],
            r#"{"id":"obj-9","name":"clip1.mp4","webViewLink":"https://drive/obj-9"}"#,
        )])
        .await;

        let client = Client::new("token").unwrap();
        let resp = client
            .upload_chunk(&format!("{url}/s"), 4, b"EFGHIJ".to_vec(), 10)
            .await
            .unwrap();
        match resp {
            ChunkResponse::Complete(file) => {
                assert_eq!(file.id, "obj-9");
                assert_eq!(file.web_view_link.as_deref(), Some("https://drive/obj-9"));
            }
            other => panic!("expected Complete, got {other:?}"),
        }

        let requests = handle.await.unwrap();
        assert!(requests[0].to_lowercase().contains("content-range: bytes 4-9/10"));
    }

    #[tokio::test]
    async fn status_query_without_range_means_nothing_received() {
        let (url, handle) = mock_sequence(vec![response("308 Resume Incomplete", &[], "")]).await;

        let client = Client::new("token").unwrap();
        let resp = client
            .query_upload_status(&format!("{url}/s"), 10)
            .await
            .unwrap();
        assert_eq!(resp, ChunkResponse::Incomplete { next_offset: 0 });

        let requests = handle.await.unwrap();
        assert!(requests[0].to_lowercase().contains("content-range: bytes */10"));
    }

    #[tokio::test]
    async fn chunk_server_error_is_transient() {
        let (url, handle) =
            mock_sequence(vec![response("503 Service Unavailable", &[], "backend")]).await;

        let client = Client::new("token").unwrap();
        let err = client
            .upload_chunk(&format!("{url}/s"), 0, b"AB".to_vec(), 2)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        handle.abort();
    }
}
