//! Upload error types.

use std::fmt;
use std::time::Duration;

use panup_api::ApiError;
use panup_transfer::{ContentDigest, TransferError};

use crate::session::SessionStatus;

/// Pipeline step an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Validate,
    Hash,
    ConflictCheck,
    Create,
    ChunkRead,
    ChunkTarget,
    ChunkPush,
    ListParts,
    Complete,
    PollAsync,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Validate => "validate",
            Step::Hash => "hash",
            Step::ConflictCheck => "conflict check",
            Step::Create => "create",
            Step::ChunkRead => "chunk read",
            Step::ChunkTarget => "chunk target",
            Step::ChunkPush => "chunk push",
            Step::ListParts => "list parts",
            Step::Complete => "complete",
            Step::PollAsync => "poll async result",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of an [`UploadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Local input problem: unreadable file, invalid filename, bad options.
    Config,
    Transport,
    Server,
    Auth,
    Integrity,
    /// The remote answered in a way the protocol does not allow.
    Protocol,
    Timeout,
    Cancelled,
    /// The conflict policy refused to upload next to an existing file.
    Declined,
}

/// Why a chunk failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFailure {
    /// The remote has no record of the chunk.
    MissingPart,
    /// The remote digest differs from the digest of the bytes sent.
    DigestMismatch { local: ContentDigest, remote: String },
}

impl fmt::Display for IntegrityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityFailure::MissingPart => f.write_str("part missing on remote"),
            IntegrityFailure::DigestMismatch { local, remote } => {
                write!(f, "digest mismatch (local {local}, remote {remote})")
            }
        }
    }
}

/// Errors produced by an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid upload input: {0}")]
    Config(String),

    #[error("{step}: {source}")]
    LocalIo {
        step: Step,
        #[source]
        source: TransferError,
    },

    #[error("{step}{}: transport error: {message}", chunk_suffix(.chunk))]
    Transport {
        step: Step,
        chunk: Option<u32>,
        message: String,
    },

    #[error("{step}{}: server error {code}: {message}", chunk_suffix(.chunk))]
    Server {
        step: Step,
        chunk: Option<u32>,
        code: i64,
        message: String,
    },

    #[error("{step}: not authorized: {message}")]
    Auth { step: Step, message: String },

    #[error("integrity check failed for chunk {chunk}: {failure}")]
    Integrity { chunk: u32, failure: IntegrityFailure },

    #[error("{step}: protocol violation: {message}")]
    Protocol { step: Step, message: String },

    #[error("illegal session transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("remote did not finish after {polls} polls in {waited:?}")]
    Timeout { waited: Duration, polls: u32 },

    #[error("cancelled during {step}")]
    Cancelled { step: Step },

    #[error("{filename} already exists in the destination folder")]
    Declined { filename: String },
}

fn chunk_suffix(chunk: &Option<u32>) -> String {
    match chunk {
        Some(index) => format!(" (chunk {index})"),
        None => String::new(),
    }
}

impl UploadError {
    /// Maps an API failure into an upload error with step context.
    pub fn from_api(step: Step, chunk: Option<u32>, err: ApiError) -> Self {
        let retryable = err.is_retryable();
        match err {
            ApiError::Http(e) if retryable => UploadError::Transport {
                step,
                chunk,
                message: e.to_string(),
            },
            ApiError::Http(e) => UploadError::Protocol {
                step,
                message: e.to_string(),
            },
            ApiError::Transport(message) => UploadError::Transport {
                step,
                chunk,
                message,
            },
            ApiError::Server { code, message } => UploadError::Server {
                step,
                chunk,
                code,
                message,
            },
            ApiError::Unauthorized { message } => UploadError::Auth { step, message },
            ApiError::InvalidToken => UploadError::Auth {
                step,
                message: "invalid access token".into(),
            },
            ApiError::Json(e) => UploadError::Protocol {
                step,
                message: format!("undecodable response: {e}"),
            },
            ApiError::Malformed(message) => UploadError::Protocol { step, message },
        }
    }

    pub(crate) fn protocol(step: Step, message: impl Into<String>) -> Self {
        UploadError::Protocol {
            step,
            message: message.into(),
        }
    }

    /// Returns the error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::Config(_) | UploadError::LocalIo { .. } => ErrorKind::Config,
            UploadError::Transport { .. } => ErrorKind::Transport,
            UploadError::Server { .. } => ErrorKind::Server,
            UploadError::Auth { .. } => ErrorKind::Auth,
            UploadError::Integrity { .. } => ErrorKind::Integrity,
            UploadError::Protocol { .. } | UploadError::InvalidTransition { .. } => {
                ErrorKind::Protocol
            }
            UploadError::Timeout { .. } => ErrorKind::Timeout,
            UploadError::Cancelled { .. } => ErrorKind::Cancelled,
            UploadError::Declined { .. } => ErrorKind::Declined,
        }
    }

    /// Returns the step that failed, when known.
    pub fn step(&self) -> Option<Step> {
        match self {
            UploadError::LocalIo { step, .. }
            | UploadError::Transport { step, .. }
            | UploadError::Server { step, .. }
            | UploadError::Auth { step, .. }
            | UploadError::Protocol { step, .. }
            | UploadError::Cancelled { step } => Some(*step),
            UploadError::Config(_) => Some(Step::Validate),
            UploadError::Integrity { .. } => Some(Step::ListParts),
            UploadError::Timeout { .. } => Some(Step::PollAsync),
            UploadError::Declined { .. } => Some(Step::ConflictCheck),
            UploadError::InvalidTransition { .. } => None,
        }
    }

    /// Returns the chunk index the error concerns, if any.
    pub fn chunk_index(&self) -> Option<u32> {
        match self {
            UploadError::Transport { chunk, .. } | UploadError::Server { chunk, .. } => *chunk,
            UploadError::Integrity { chunk, .. } => Some(*chunk),
            _ => None,
        }
    }

    /// Returns the message the remote sent, if the error came from it.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            UploadError::Server { message, .. } | UploadError::Auth { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }

    /// Returns `true` when repeating the failed request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Transport { .. })
    }
}
