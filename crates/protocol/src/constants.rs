/// Production API host.
pub const DEFAULT_BASE_URL: &str = "https://open-api.123pan.com";

/// Name of the header identifying the client platform.
pub const PLATFORM_HEADER: &str = "platform";

/// Value sent in [`PLATFORM_HEADER`] by open-platform clients.
pub const PLATFORM_VALUE: &str = "open_platform";

/// Envelope code for a successful call.
pub const CODE_OK: i64 = 0;

/// Envelope code returned when the access token is missing, invalid or expired.
pub const CODE_UNAUTHORIZED: i64 = 401;

/// Page size used for directory listings.
pub const LIST_PAGE_LIMIT: u32 = 100;

/// `lastFileId` value marking the final page of a listing.
pub const LAST_PAGE_MARKER: i64 = -1;

/// `searchMode` value requesting exact filename matches.
pub const SEARCH_MODE_EXACT: u8 = 1;

/// HTTP method used by an [`Endpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// API endpoint identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    // Upload session
    CreateFile,
    GetUploadUrl,
    ListUploadParts,
    UploadComplete,
    UploadAsyncResult,

    // Auxiliary
    Mkdir,
    FileList,
}

impl Endpoint {
    /// Path relative to the API host.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::CreateFile => "/upload/v1/file/create",
            Endpoint::GetUploadUrl => "/upload/v1/file/get_upload_url",
            Endpoint::ListUploadParts => "/upload/v1/file/list_upload_parts",
            Endpoint::UploadComplete => "/upload/v1/file/upload_complete",
            Endpoint::UploadAsyncResult => "/upload/v1/file/upload_async_result",
            Endpoint::Mkdir => "/upload/v1/file/mkdir",
            Endpoint::FileList => "/api/v2/file/list",
        }
    }

    /// HTTP method the endpoint expects.
    pub fn method(self) -> HttpMethod {
        match self {
            Endpoint::FileList => HttpMethod::Get,
            _ => HttpMethod::Post,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_endpoints_are_posts() {
        for ep in [
            Endpoint::CreateFile,
            Endpoint::GetUploadUrl,
            Endpoint::ListUploadParts,
            Endpoint::UploadComplete,
            Endpoint::UploadAsyncResult,
            Endpoint::Mkdir,
        ] {
            assert_eq!(ep.method(), HttpMethod::Post, "{ep:?}");
            assert!(ep.path().starts_with("/upload/v1/file/"));
        }
    }

    #[test]
    fn file_list_is_get() {
        assert_eq!(Endpoint::FileList.method(), HttpMethod::Get);
        assert_eq!(Endpoint::FileList.path(), "/api/v2/file/list");
    }
}
