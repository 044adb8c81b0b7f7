//! Wire protocol types for the 123pan open-platform API.
//!
//! Every endpoint answers with the same JSON [`Envelope`]; the payload
//! types in [`messages`] describe the `data` member of each response and
//! the bodies of each request. This crate performs no I/O.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{CODE_OK, CODE_UNAUTHORIZED, DEFAULT_BASE_URL, Endpoint, HttpMethod};
pub use envelope::Envelope;
pub use messages::{
    AsyncResultResponse, CompleteUploadResponse, CreateFileRequest, CreateFileResponse,
    FileListResponse, ListPartsResponse, MkdirRequest, MkdirResponse, PreuploadRequest,
    UploadUrlRequest, UploadUrlResponse,
};
pub use types::{FileInfo, UploadedPart};
