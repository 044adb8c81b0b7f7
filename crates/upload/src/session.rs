//! Upload session state: dedup check, chunk plan and per-chunk records.

use std::collections::BTreeMap;
use std::ops::Range;

use panup_protocol::{CreateFileRequest, CreateFileResponse};
use panup_transfer::{ChunkPlan, ContentDigest, plan_chunks};
use tracing::debug;

use crate::error::{Step, UploadError};
use crate::remote::RemoteApi;
use crate::types::UploadRequest;

/// Lifecycle of an [`UploadSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Init,
    DedupChecked,
    Planned,
    Transferring,
    AllChunksSent,
    Verified,
    Completing,
    AsyncPending,
    Completed,
    Failed,
}

impl SessionStatus {
    /// Returns `true` for states a session never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    /// Returns `true` if `self -> to` is a legal transition.
    pub fn can_transition(self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, to) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Init, DedupChecked)
            | (DedupChecked, Completed)
            | (DedupChecked, Planned)
            | (Planned, Transferring)
            | (Planned, AllChunksSent)
            | (Transferring, AllChunksSent)
            | (AllChunksSent, Verified)
            | (Verified, Completing)
            | (Completing, Completed)
            | (Completing, AsyncPending)
            | (AsyncPending, Completed) => true,
            _ => false,
        }
    }
}

/// Transfer state of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    Sent,
    Verified,
    Failed,
}

/// One planned chunk and what is known about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub index: u32,
    pub range: Range<u64>,
    /// Digest of the bytes pushed, set once the chunk is sent.
    pub local_digest: Option<ContentDigest>,
    pub status: ChunkStatus,
}

impl ChunkRecord {
    fn pending(plan: ChunkPlan) -> Self {
        Self {
            index: plan.index,
            range: plan.range,
            local_digest: None,
            status: ChunkStatus::Pending,
        }
    }

    /// Byte range as a plan for the reader.
    pub fn plan(&self) -> ChunkPlan {
        ChunkPlan {
            index: self.index,
            range: self.range.clone(),
        }
    }
}

/// Result of the dedup check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupOutcome {
    /// The remote already holds identical content under `file_id`.
    Reused { file_id: i64 },
    /// Content must be sent in `total_chunks` chunks of `slice_size` bytes.
    ChunkedUpload {
        preupload_id: String,
        slice_size: u64,
        total_chunks: u32,
    },
}

/// State of one file upload.
///
/// Owned by the task driving the upload; never shared between tasks.
#[derive(Debug)]
pub struct UploadSession {
    request: UploadRequest,
    file_size: u64,
    file_digest: ContentDigest,
    preupload_id: Option<String>,
    remote_file_id: Option<i64>,
    slice_size: u64,
    chunks: BTreeMap<u32, ChunkRecord>,
    status: SessionStatus,
}

impl UploadSession {
    /// Creates a session for a file already hashed.
    pub fn new(request: UploadRequest, file_size: u64, file_digest: ContentDigest) -> Self {
        Self {
            request,
            file_size,
            file_digest,
            preupload_id: None,
            remote_file_id: None,
            slice_size: 0,
            chunks: BTreeMap::new(),
            status: SessionStatus::Init,
        }
    }

    pub fn request(&self) -> &UploadRequest {
        &self.request
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn file_digest(&self) -> ContentDigest {
        self.file_digest
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Session token issued by the remote, once the dedup check ran.
    pub fn preupload_id(&self) -> Option<&str> {
        self.preupload_id.as_deref()
    }

    pub fn remote_file_id(&self) -> Option<i64> {
        self.remote_file_id
    }

    pub fn slice_size(&self) -> u64 {
        self.slice_size
    }

    pub fn total_chunks(&self) -> u32 {
        self.chunks.len() as u32
    }

    pub fn chunk(&self, index: u32) -> Option<&ChunkRecord> {
        self.chunks.get(&index)
    }

    /// Records in index order.
    pub fn chunks(&self) -> impl Iterator<Item = &ChunkRecord> {
        self.chunks.values()
    }

    /// Chunks not yet sent, in index order.
    pub fn pending_chunks(&self) -> Vec<ChunkPlan> {
        self.chunks
            .values()
            .filter(|c| c.status == ChunkStatus::Pending)
            .map(ChunkRecord::plan)
            .collect()
    }

    /// Remote verification applies only to multi-chunk uploads.
    pub fn requires_verification(&self) -> bool {
        self.total_chunks() > 1
    }

    /// Moves to `to`, rejecting illegal transitions.
    pub fn transition(&mut self, to: SessionStatus) -> Result<(), UploadError> {
        if !self.status.can_transition(to) {
            return Err(UploadError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        debug!(filename = %self.request.filename, from = ?self.status, ?to, "session transition");
        self.status = to;
        Ok(())
    }

    /// Marks the session failed unless it already ended.
    pub fn fail(&mut self) {
        if !self.status.is_terminal() {
            self.status = SessionStatus::Failed;
        }
    }

    /// Registers the file with the remote and plans the chunks.
    pub async fn initiate(&mut self, remote: &dyn RemoteApi) -> Result<DedupOutcome, UploadError> {
        if self.status != SessionStatus::Init {
            return Err(UploadError::InvalidTransition {
                from: self.status,
                to: SessionStatus::DedupChecked,
            });
        }
        let req = CreateFileRequest {
            parent_file_id: self.request.destination_folder_id,
            filename: self.request.filename.clone(),
            etag: self.file_digest.to_hex(),
            size: self.file_size,
        };
        let resp = remote
            .create_file(&req)
            .await
            .map_err(|e| UploadError::from_api(Step::Create, None, e))?;
        self.accept_create_response(resp)
    }

    /// Applies the dedup-check answer.
    pub fn accept_create_response(
        &mut self,
        resp: CreateFileResponse,
    ) -> Result<DedupOutcome, UploadError> {
        self.transition(SessionStatus::DedupChecked)?;

        if resp.reuse {
            if resp.file_id <= 0 {
                return Err(UploadError::protocol(
                    Step::Create,
                    format!("reuse reported without a file id ({})", resp.file_id),
                ));
            }
            self.remote_file_id = Some(resp.file_id);
            self.transition(SessionStatus::Completed)?;
            return Ok(DedupOutcome::Reused {
                file_id: resp.file_id,
            });
        }

        if resp.preupload_id.is_empty() {
            return Err(UploadError::protocol(
                Step::Create,
                "no preuploadID in create response",
            ));
        }
        if self.file_size > 0 && resp.slice_size == 0 {
            return Err(UploadError::protocol(
                Step::Create,
                "no sliceSize in create response",
            ));
        }

        let plan = plan_chunks(self.file_size, resp.slice_size).ok_or_else(|| {
            UploadError::protocol(
                Step::Create,
                format!(
                    "sliceSize {} yields too many chunks for {} bytes",
                    resp.slice_size, self.file_size
                ),
            )
        })?;

        self.slice_size = resp.slice_size;
        self.chunks = plan
            .into_iter()
            .map(|plan| (plan.index, ChunkRecord::pending(plan)))
            .collect();
        self.preupload_id = Some(resp.preupload_id.clone());
        self.transition(SessionStatus::Planned)?;

        Ok(DedupOutcome::ChunkedUpload {
            preupload_id: resp.preupload_id,
            slice_size: self.slice_size,
            total_chunks: self.total_chunks(),
        })
    }

    /// Enters the transfer phase. A session with no chunks skips straight
    /// to [`SessionStatus::AllChunksSent`].
    pub fn begin_transfer(&mut self) -> Result<(), UploadError> {
        if self.chunks.is_empty() {
            self.transition(SessionStatus::AllChunksSent)
        } else {
            self.transition(SessionStatus::Transferring)
        }
    }

    /// Records that chunk `index` was accepted with the given digest.
    ///
    /// A chunk can be marked sent only once.
    pub fn mark_sent(&mut self, index: u32, digest: ContentDigest) -> Result<(), UploadError> {
        let record = self.chunks.get_mut(&index).ok_or_else(|| {
            UploadError::protocol(Step::ChunkPush, format!("chunk {index} is not planned"))
        })?;
        if record.status != ChunkStatus::Pending {
            return Err(UploadError::protocol(
                Step::ChunkPush,
                format!("chunk {index} already {:?}", record.status),
            ));
        }
        record.local_digest = Some(digest);
        record.status = ChunkStatus::Sent;
        Ok(())
    }

    pub fn mark_failed(&mut self, index: u32) {
        if let Some(record) = self.chunks.get_mut(&index) {
            record.status = ChunkStatus::Failed;
        }
    }

    pub(crate) fn mark_verified(&mut self, index: u32) {
        if let Some(record) = self.chunks.get_mut(&index)
            && record.status == ChunkStatus::Sent
        {
            record.status = ChunkStatus::Verified;
        }
    }

    /// Leaves the transfer phase once every chunk is sent.
    pub fn finish_transfer(&mut self) -> Result<(), UploadError> {
        if let Some(unsent) = self.chunks.values().find(|c| c.status != ChunkStatus::Sent) {
            return Err(UploadError::protocol(
                Step::ChunkPush,
                format!("chunk {} is {:?}, not sent", unsent.index, unsent.status),
            ));
        }
        self.transition(SessionStatus::AllChunksSent)
    }

    pub(crate) fn set_remote_file_id(&mut self, file_id: i64) {
        self.remote_file_id = Some(file_id);
    }
}
