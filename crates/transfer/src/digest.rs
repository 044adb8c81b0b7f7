use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{HASH_WINDOW, TransferError};

/// MD5 digest of a byte sequence.
///
/// The remote service compares these against its `etag` fields, so the
/// canonical text form is 32 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 16]);

/// Error returned when a string is not a 32-character hex digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid digest: {0:?}")]
pub struct DigestParseError(pub String);

impl ContentDigest {
    /// Computes the digest of an in-memory buffer.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = ContentHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Parses a hex digest, accepting either case.
    pub fn from_hex(s: &str) -> Result<Self, DigestParseError> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s.trim(), &mut bytes).map_err(|_| DigestParseError(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// Lowercase hex form, as sent in `etag` fields.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl FromStr for ContentDigest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental MD5 hasher.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Md5,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds more bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Consumes the hasher and returns the digest.
    pub fn finalize(self) -> ContentDigest {
        let out = self.inner.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&out);
        ContentDigest(bytes)
    }
}

/// Hashes everything `reader` yields, [`HASH_WINDOW`] bytes at a time.
pub fn digest_reader<R: Read>(mut reader: R) -> std::io::Result<ContentDigest> {
    let mut hasher = ContentHasher::new();
    let mut buf = [0u8; HASH_WINDOW];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// Hashes a whole file without loading it into memory.
pub fn digest_file(path: &Path) -> Result<ContentDigest, TransferError> {
    let file = std::fs::File::open(path)?;
    Ok(digest_reader(file)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Reader that fails after yielding some bytes.
    struct FailingReader {
        remaining: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.remaining == 0 {
                return Err(std::io::Error::other("disk went away"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(0xAB);
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn known_md5_vectors() {
        assert_eq!(
            ContentDigest::of(b"").to_hex(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            ContentDigest::of(b"The quick brown fox jumps over the lazy dog").to_hex(),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn digest_is_deterministic() {
        let data = vec![7u8; 10_000];
        assert_eq!(ContentDigest::of(&data), ContentDigest::of(&data));
    }

    #[test]
    fn single_byte_mutation_changes_digest() {
        let original = vec![0u8; 9_000];
        let base = ContentDigest::of(&original);
        for pos in [0, 4_095, 4_096, 8_999] {
            let mut mutated = original.clone();
            mutated[pos] ^= 1;
            assert_ne!(ContentDigest::of(&mutated), base, "mutation at {pos}");
        }
    }

    #[test]
    fn reader_digest_matches_buffer_digest() {
        // Spans several hash windows with a ragged tail.
        let data: Vec<u8> = (0..(HASH_WINDOW * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let streamed = digest_reader(std::io::Cursor::new(&data)).unwrap();
        assert_eq!(streamed, ContentDigest::of(&data));
    }

    #[test]
    fn file_digest_matches_buffer_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let data = b"content for file digest".repeat(500);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&data)
            .unwrap();

        assert_eq!(digest_file(&path).unwrap(), ContentDigest::of(&data));
    }

    #[test]
    fn read_failure_propagates() {
        let err = digest_reader(FailingReader { remaining: 5_000 }).unwrap_err();
        assert_eq!(err.to_string(), "disk went away");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = digest_file(&dir.path().join("nope"));
        assert!(matches!(result, Err(TransferError::Io(_))));
    }

    #[test]
    fn hex_parse_is_case_insensitive() {
        let d = ContentDigest::of(b"abc");
        let upper = d.to_hex().to_uppercase();
        assert_eq!(ContentDigest::from_hex(&upper).unwrap(), d);
        assert_eq!(upper.parse::<ContentDigest>().unwrap(), d);
    }

    #[test]
    fn hex_parse_rejects_wrong_length() {
        assert!(ContentDigest::from_hex("abcd").is_err());
        assert!(ContentDigest::from_hex("zz").is_err());
    }

    #[test]
    fn serde_uses_hex_string() {
        let d = ContentDigest::of(b"abc");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", d.to_hex()));
        let back: ContentDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
