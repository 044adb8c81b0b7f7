use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::TransferError;
use crate::plan::ChunkPlan;

/// Read-only handle for pulling chunks out of a file at arbitrary offsets.
///
/// Reads are positioned (`pread` on Unix, `ReadFile` with an offset on
/// Windows), so clones of one source can be read from different threads
/// without sharing a cursor.
#[derive(Debug, Clone)]
pub struct ChunkSource {
    file: Arc<File>,
    len: u64,
}

impl ChunkSource {
    /// Opens `path` for chunked reading.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
        })
    }

    /// Opens `path` and checks it still has the size it had when hashed.
    pub fn open_expecting(path: &Path, expected_len: u64) -> Result<Self, TransferError> {
        let source = Self::open(path)?;
        if source.len != expected_len {
            return Err(TransferError::SizeChanged {
                expected: expected_len,
                actual: source.len,
            });
        }
        Ok(source)
    }

    /// File size in bytes at open time.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads exactly the bytes of `chunk`.
    pub fn read_chunk(&self, chunk: &ChunkPlan) -> Result<Bytes, TransferError> {
        if chunk.range.end > self.len {
            return Err(TransferError::SizeChanged {
                expected: chunk.range.end,
                actual: self.len,
            });
        }
        let mut buf = vec![0u8; chunk.len() as usize];
        read_exact_at(&self.file, &mut buf, chunk.range.start)?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ));
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
