//! Request bodies and response payloads, one pair per endpoint.
//!
//! Field names follow the remote API verbatim (`preuploadID`, `sliceNo`, …),
//! which does not map onto a single serde `rename_all` rule.

use serde::{Deserialize, Serialize};

use crate::types::{FileInfo, UploadedPart};

// ---------------------------------------------------------------------------
// create (dedup check)
// ---------------------------------------------------------------------------

/// Body of `POST /upload/v1/file/create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFileRequest {
    #[serde(rename = "parentFileID")]
    pub parent_file_id: i64,
    pub filename: String,
    /// Lowercase hex MD5 of the whole file.
    pub etag: String,
    pub size: u64,
}

/// `data` of a create response.
///
/// When `reuse` is true the content was already stored and `file_id` is
/// final; otherwise `preupload_id` and `slice_size` describe the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateFileResponse {
    #[serde(rename = "fileID", default)]
    pub file_id: i64,
    #[serde(rename = "preuploadID", default)]
    pub preupload_id: String,
    #[serde(default)]
    pub reuse: bool,
    #[serde(rename = "sliceSize", default)]
    pub slice_size: u64,
}

// ---------------------------------------------------------------------------
// per-chunk transfer target
// ---------------------------------------------------------------------------

/// Body of `POST /upload/v1/file/get_upload_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadUrlRequest {
    #[serde(rename = "preuploadID")]
    pub preupload_id: String,
    /// 1-based chunk index.
    #[serde(rename = "sliceNo")]
    pub slice_no: u32,
}

/// `data` of a get_upload_url response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadUrlResponse {
    #[serde(rename = "presignedURL", default)]
    pub presigned_url: String,
}

// ---------------------------------------------------------------------------
// session-scoped calls
// ---------------------------------------------------------------------------

/// Body shared by list_upload_parts, upload_complete and upload_async_result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreuploadRequest {
    #[serde(rename = "preuploadID")]
    pub preupload_id: String,
}

/// `data` of a list_upload_parts response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListPartsResponse {
    #[serde(default)]
    pub parts: Vec<UploadedPart>,
}

/// `data` of an upload_complete response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteUploadResponse {
    #[serde(rename = "fileID", default)]
    pub file_id: i64,
    /// Finalization was deferred to background processing.
    #[serde(rename = "async", default)]
    pub is_async: bool,
    #[serde(default)]
    pub completed: bool,
}

/// `data` of an upload_async_result response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AsyncResultResponse {
    #[serde(default)]
    pub completed: bool,
    #[serde(rename = "fileID", default)]
    pub file_id: i64,
}

// ---------------------------------------------------------------------------
// auxiliary
// ---------------------------------------------------------------------------

/// Body of `POST /upload/v1/file/mkdir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MkdirRequest {
    pub name: String,
    #[serde(rename = "parentID")]
    pub parent_id: i64,
}

/// `data` of a mkdir response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MkdirResponse {
    #[serde(rename = "dirID")]
    pub dir_id: i64,
}

/// `data` of a `GET /api/v2/file/list` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileListResponse {
    #[serde(rename = "lastFileId", default)]
    pub last_file_id: i64,
    #[serde(rename = "fileList", default)]
    pub file_list: Vec<FileInfo>,
}
