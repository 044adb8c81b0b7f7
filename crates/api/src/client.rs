//! 123pan API client.

use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use panup_protocol::constants::{
    LAST_PAGE_MARKER, LIST_PAGE_LIMIT, PLATFORM_HEADER, PLATFORM_VALUE, SEARCH_MODE_EXACT,
};
use panup_protocol::{
    AsyncResultResponse, CompleteUploadResponse, CreateFileRequest, CreateFileResponse,
    DEFAULT_BASE_URL, Endpoint, Envelope, FileInfo, FileListResponse, HttpMethod,
    ListPartsResponse, MkdirRequest, MkdirResponse, PreuploadRequest, UploadUrlRequest,
    UploadUrlResponse, UploadedPart,
};

use crate::error::ApiError;

/// Timeout for establishing a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for JSON API calls.
const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for a single chunk PUT. Chunks can be tens of MiB.
const CHUNK_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// 123pan open-platform API client.
#[derive(Clone)]
pub struct Client {
    /// Authenticated client for JSON API calls.
    api: reqwest::Client,
    /// Plain client for presigned chunk targets. The targets carry their own
    /// credentials, so the bearer header must not be sent to them.
    transfer: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Creates a client authenticating with `access_token`.
    pub fn new(access_token: &str) -> Result<Self, ApiError> {
        if access_token.trim().is_empty() {
            return Err(ApiError::InvalidToken);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {access_token}"))
                .map_err(|_| ApiError::InvalidToken)?,
        );
        headers.insert(
            HeaderName::from_static(PLATFORM_HEADER),
            HeaderValue::from_static(PLATFORM_VALUE),
        );

        let api = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(API_REQUEST_TIMEOUT)
            .build()?;

        let transfer = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(CHUNK_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            api,
            transfer,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Points the client at a different API host (staging, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the API host in use.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// Performs an authenticated JSON POST and unwraps the envelope.
    async fn post<Req, Resp>(&self, endpoint: Endpoint, body: &Req) -> Result<Resp, ApiError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        debug_assert_eq!(endpoint.method(), HttpMethod::Post);
        trace!(endpoint = endpoint.path(), "POST");
        let resp = self.api.post(self.url(endpoint)).json(body).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        decode_envelope(status, &body)
    }

    /// Performs an authenticated GET with query parameters and unwraps the envelope.
    async fn get<Resp>(
        &self,
        endpoint: Endpoint,
        params: &[(&str, String)],
    ) -> Result<Resp, ApiError>
    where
        Resp: DeserializeOwned,
    {
        debug_assert_eq!(endpoint.method(), HttpMethod::Get);
        trace!(endpoint = endpoint.path(), "GET");
        let resp = self
            .api
            .get(self.url(endpoint))
            .query(params)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        decode_envelope(status, &body)
    }

    /// Registers a file with the remote and runs the dedup check.
    pub async fn create_file(
        &self,
        req: &CreateFileRequest,
    ) -> Result<CreateFileResponse, ApiError> {
        let resp: CreateFileResponse = self.post(Endpoint::CreateFile, req).await?;
        debug!(
            filename = %req.filename,
            reuse = resp.reuse,
            slice_size = resp.slice_size,
            "create file"
        );
        Ok(resp)
    }

    /// Requests a single-use transfer target for one chunk.
    pub async fn get_upload_url(
        &self,
        preupload_id: &str,
        slice_no: u32,
    ) -> Result<String, ApiError> {
        let req = UploadUrlRequest {
            preupload_id: preupload_id.to_string(),
            slice_no,
        };
        let resp: UploadUrlResponse = self.post(Endpoint::GetUploadUrl, &req).await?;
        if resp.presigned_url.is_empty() {
            return Err(ApiError::Malformed(format!(
                "empty presignedURL for slice {slice_no}"
            )));
        }
        Ok(resp.presigned_url)
    }

    /// Pushes raw chunk bytes to a transfer target.
    ///
    /// Any non-2xx status is reported as [`ApiError::Transport`].
    pub async fn put_chunk(&self, target: &str, data: Bytes) -> Result<(), ApiError> {
        let len = data.len();
        let resp = self
            .transfer
            .put(target)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Transport(format!(
                "chunk PUT returned HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }
        trace!(bytes = len, "chunk pushed");
        Ok(())
    }

    /// Lists the chunks the remote has recorded for a session.
    pub async fn list_upload_parts(
        &self,
        preupload_id: &str,
    ) -> Result<Vec<UploadedPart>, ApiError> {
        let req = PreuploadRequest {
            preupload_id: preupload_id.to_string(),
        };
        let resp: ListPartsResponse = self.post(Endpoint::ListUploadParts, &req).await?;
        Ok(resp.parts)
    }

    /// Asks the remote to finalize a session.
    pub async fn complete_upload(
        &self,
        preupload_id: &str,
    ) -> Result<CompleteUploadResponse, ApiError> {
        let req = PreuploadRequest {
            preupload_id: preupload_id.to_string(),
        };
        self.post(Endpoint::UploadComplete, &req).await
    }

    /// Queries the result of a deferred finalization.
    pub async fn upload_async_result(
        &self,
        preupload_id: &str,
    ) -> Result<AsyncResultResponse, ApiError> {
        let req = PreuploadRequest {
            preupload_id: preupload_id.to_string(),
        };
        self.post(Endpoint::UploadAsyncResult, &req).await
    }

    /// Creates a directory and returns its id.
    pub async fn create_directory(&self, name: &str, parent_id: i64) -> Result<i64, ApiError> {
        let req = MkdirRequest {
            name: name.to_string(),
            parent_id,
        };
        let resp: MkdirResponse = self.post(Endpoint::Mkdir, &req).await?;
        debug!(name, parent_id, dir_id = resp.dir_id, "directory created");
        Ok(resp.dir_id)
    }

    /// Looks up an entry named exactly `filename` directly under `parent_id`.
    ///
    /// The remote search ignores `parentFileId` and matches in every
    /// folder, so hits are filtered on their parent here and later pages
    /// are fetched until a match or the last page.
    pub async fn find_file(
        &self,
        parent_id: i64,
        filename: &str,
    ) -> Result<Option<FileInfo>, ApiError> {
        let mut cursor: Option<i64> = None;
        loop {
            let mut params = vec![
                ("parentFileId", parent_id.to_string()),
                ("limit", LIST_PAGE_LIMIT.to_string()),
                ("searchData", filename.to_string()),
                ("searchMode", SEARCH_MODE_EXACT.to_string()),
            ];
            if let Some(last) = cursor {
                params.push(("lastFileId", last.to_string()));
            }
            let page: FileListResponse = self.get(Endpoint::FileList, &params).await?;
            let exhausted = page.file_list.is_empty()
                || page.last_file_id == LAST_PAGE_MARKER
                || cursor == Some(page.last_file_id);
            if let Some(found) = page
                .file_list
                .into_iter()
                .find(|f| f.filename == filename && f.parent_file_id == parent_id)
            {
                return Ok(Some(found));
            }
            if exhausted {
                return Ok(None);
            }
            trace!(parent_id, last_file_id = page.last_file_id, "fetching next search page");
            cursor = Some(page.last_file_id);
        }
    }
}

/// Classifies an HTTP answer and extracts the envelope's `data`.
fn decode_envelope<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, ApiError> {
    let envelope: Envelope<T> = match serde_json::from_slice(body) {
        Ok(env) => env,
        Err(_) if status == StatusCode::UNAUTHORIZED => {
            return Err(ApiError::Unauthorized {
                message: String::from_utf8_lossy(body).trim().to_string(),
            });
        }
        Err(_) if !status.is_success() => {
            return Err(ApiError::Transport(format!(
                "HTTP {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(body).trim()
            )));
        }
        Err(e) => return Err(ApiError::Json(e)),
    };

    if envelope.is_unauthorized() || status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized {
            message: envelope.message,
        });
    }
    if !envelope.is_ok() {
        return Err(ApiError::Server {
            code: envelope.code,
            message: envelope.message,
        });
    }
    envelope
        .data
        .ok_or_else(|| ApiError::Malformed("success response without data".into()))
}
