//! Client-side driver for chunked, deduplicating uploads.
//!
//! This crate holds the **business logic** of an upload. It talks to the
//! remote through the [`RemoteApi`] trait, implemented for
//! [`panup_api::Client`] and by mocks in tests.
//!
//! # Pipeline
//!
//! 1. **Hash**: MD5 over the whole file
//! 2. **Dedup check**: register the file; the remote may already hold it
//! 3. **Plan**: split into fixed-size chunks
//! 4. **Transfer**: push chunks in parallel, each to a fresh target
//! 5. **Verify**: compare remote part digests with local ones
//! 6. **Complete**: finalize, polling when the remote defers

pub mod chunk;
pub mod complete;
pub mod conflict;
pub mod error;
pub mod remote;
pub mod session;
pub mod types;
pub mod uploader;
pub mod verify;

#[cfg(test)]
mod mock;

// Re-export primary types for convenience.
pub use chunk::{ChunkTransfer, RetryPolicy};
pub use complete::{CompletionCoordinator, PollConfig};
pub use conflict::{ConflictPolicy, copy_candidate};
pub use error::{ErrorKind, IntegrityFailure, Step, UploadError};
pub use remote::{RemoteApi, RemoteFuture};
pub use session::{ChunkRecord, ChunkStatus, DedupOutcome, SessionStatus, UploadSession};
pub use types::{CompletionResult, UploadEvent, UploadOptions, UploadRequest};
pub use uploader::Uploader;
pub use verify::PartVerifier;
