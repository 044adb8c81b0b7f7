//! Remote API seam.
//!
//! `RemoteApi` is implemented for [`panup_api::Client`]. Keeping the upload
//! logic behind a trait lets it run against scripted mocks.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use panup_api::{ApiError, Client};
use panup_protocol::{
    AsyncResultResponse, CompleteUploadResponse, CreateFileRequest, CreateFileResponse,
    FileInfo, UploadedPart,
};

/// Boxed future returned by [`RemoteApi`] methods.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Abstract connection to the remote storage.
pub trait RemoteApi: Send + Sync {
    /// Registers a file and runs the dedup check.
    fn create_file<'a>(
        &'a self,
        req: &'a CreateFileRequest,
    ) -> RemoteFuture<'a, CreateFileResponse>;

    /// Requests a single-use transfer target for chunk `slice_no`.
    fn get_upload_url<'a>(&'a self, preupload_id: &'a str, slice_no: u32)
    -> RemoteFuture<'a, String>;

    /// Pushes chunk bytes to a transfer target.
    fn put_chunk<'a>(&'a self, target: &'a str, data: Bytes) -> RemoteFuture<'a, ()>;

    /// Lists the parts the remote has recorded for a session.
    fn list_upload_parts<'a>(&'a self, preupload_id: &'a str)
    -> RemoteFuture<'a, Vec<UploadedPart>>;

    /// Asks the remote to finalize a session.
    fn complete_upload<'a>(&'a self, preupload_id: &'a str)
    -> RemoteFuture<'a, CompleteUploadResponse>;

    /// Queries a deferred finalization.
    fn upload_async_result<'a>(
        &'a self,
        preupload_id: &'a str,
    ) -> RemoteFuture<'a, AsyncResultResponse>;

    /// Looks up an entry with exactly this name in a folder.
    fn find_file<'a>(&'a self, parent_id: i64, filename: &'a str)
    -> RemoteFuture<'a, Option<FileInfo>>;
}

impl RemoteApi for Client {
    fn create_file<'a>(
        &'a self,
        req: &'a CreateFileRequest,
    ) -> RemoteFuture<'a, CreateFileResponse> {
        Box::pin(Client::create_file(self, req))
    }

    fn get_upload_url<'a>(
        &'a self,
        preupload_id: &'a str,
        slice_no: u32,
    ) -> RemoteFuture<'a, String> {
        Box::pin(Client::get_upload_url(self, preupload_id, slice_no))
    }

    fn put_chunk<'a>(&'a self, target: &'a str, data: Bytes) -> RemoteFuture<'a, ()> {
        Box::pin(Client::put_chunk(self, target, data))
    }

    fn list_upload_parts<'a>(
        &'a self,
        preupload_id: &'a str,
    ) -> RemoteFuture<'a, Vec<UploadedPart>> {
        Box::pin(Client::list_upload_parts(self, preupload_id))
    }

    fn complete_upload<'a>(
        &'a self,
        preupload_id: &'a str,
    ) -> RemoteFuture<'a, CompleteUploadResponse> {
        Box::pin(Client::complete_upload(self, preupload_id))
    }

    fn upload_async_result<'a>(
        &'a self,
        preupload_id: &'a str,
    ) -> RemoteFuture<'a, AsyncResultResponse> {
        Box::pin(Client::upload_async_result(self, preupload_id))
    }

    fn find_file<'a>(
        &'a self,
        parent_id: i64,
        filename: &'a str,
    ) -> RemoteFuture<'a, Option<FileInfo>> {
        Box::pin(Client::find_file(self, parent_id, filename))
    }
}
