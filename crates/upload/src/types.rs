//! Data types for the upload flow.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use crate::chunk::RetryPolicy;
use crate::complete::PollConfig;
use crate::conflict::ConflictPolicy;

/// Default number of chunks in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// What to upload and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub local_path: PathBuf,
    pub destination_folder_id: i64,
    /// Name the file gets on the remote.
    pub filename: String,
}

impl UploadRequest {
    /// Creates a request that keeps the local base name.
    pub fn new(local_path: impl Into<PathBuf>, destination_folder_id: i64) -> Self {
        let local_path = local_path.into();
        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            local_path,
            destination_folder_id,
            filename,
        }
    }

    /// Overrides the remote filename.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }
}

/// Tuning knobs for an upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Chunks in flight at once. Values below 1 are treated as 1.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub poll: PollConfig,
    pub conflict: ConflictPolicy,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            poll: PollConfig::default(),
            conflict: ConflictPolicy::default(),
        }
    }
}

/// Outcome of a finished upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionResult {
    pub remote_file_id: i64,
    /// The remote deferred finalization and it was awaited by polling.
    pub is_async: bool,
    pub is_completed: bool,
}

/// Progress event emitted during an upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// Computing the whole-file digest.
    Hashing { filename: String, size: u64 },
    /// The conflict policy picked a different remote name.
    Renamed { from: String, to: String },
    /// The remote already holds identical content.
    Reused { file_id: i64 },
    /// Chunk plan fixed.
    Planned {
        total_chunks: u32,
        slice_size: u64,
        size: u64,
    },
    /// One chunk accepted by its transfer target.
    ChunkSent {
        index: u32,
        bytes: u64,
        sent_chunks: u32,
        total_chunks: u32,
    },
    /// A chunk push failed and will be retried.
    ChunkRetry { index: u32, attempt: u32 },
    /// Comparing remote part digests.
    Verifying { total_chunks: u32 },
    /// Finalization requested.
    Completing,
    /// The remote deferred finalization; polling.
    WaitingAsync { polls: u32 },
    /// Upload finished.
    Completed { file_id: i64 },
    /// Upload failed.
    Failed { error: String },
}

/// Sends a progress event without waiting. A full or closed channel drops it.
pub(crate) fn emit(events: Option<&mpsc::Sender<UploadEvent>>, event: UploadEvent) {
    if let Some(tx) = events {
        let _ = tx.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_to_base_name() {
        let req = UploadRequest::new("/data/backups/archive.tar.gz", 9);
        assert_eq!(req.filename, "archive.tar.gz");
        assert_eq!(req.destination_folder_id, 9);
    }

    #[test]
    fn request_filename_override() {
        let req = UploadRequest::new("/tmp/a.bin", 0).with_filename("b.bin");
        assert_eq!(req.filename, "b.bin");
        assert_eq!(req.local_path(), Path::new("/tmp/a.bin"));
    }

    #[test]
    fn options_defaults() {
        let opts = UploadOptions::default();
        assert_eq!(opts.concurrency, 4);
        assert_eq!(opts.conflict, ConflictPolicy::Allow);
    }
}
