//! Local side of a chunked upload: hashing, chunk planning and reading.
//!
//! Everything here is blocking std I/O; async callers wrap it in
//! `spawn_blocking`.

mod digest;
mod plan;
mod progress;
mod reader;
mod validation;

pub use digest::{ContentDigest, ContentHasher, DigestParseError, digest_file, digest_reader};
pub use plan::{ChunkPlan, plan_chunks, total_chunks};
pub use progress::SpeedCalculator;
pub use reader::ChunkSource;
pub use validation::validate_remote_filename;

/// Read window used while hashing: 4 KiB.
///
/// Memory use while hashing is bounded by this, independent of file size.
pub const HASH_WINDOW: usize = 4 * 1024;

/// Maximum length of a remote filename, in characters.
pub const MAX_FILENAME_CHARS: usize = 255;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("file changed while uploading: expected {expected} bytes, found {actual}")]
    SizeChanged { expected: u64, actual: u64 },
}
