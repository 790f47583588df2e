//! Internal implementation of content hashing.

use crate::{HashError, HashResult};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::{fmt, str::FromStr};

/// Digest length in bytes.
pub const HASH_LEN: usize = 32;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// A 256-bit content digest in Ark's canonical form.
///
/// Once constructed the digest is guaranteed to hold exactly [`HASH_LEN`] bytes, so it can be
/// used as a repository key or to derive a sharded path without further checks.
///
/// # Construction
/// - [`ContentHasher`] produces a digest from file or stream content.
/// - [`ContentHash::from_slice`] validates raw bytes received over the wire.
/// - [`ContentHash::parse`] validates a canonical hex string (REST lookups, stored records).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; HASH_LEN]);

impl ContentHash {
    /// Wraps an already-computed digest.
    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Validates raw digest bytes, for example the `hash` field of an upload request.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::InvalidInput`] unless `bytes` is exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> HashResult<Self> {
        let array: [u8; HASH_LEN] = bytes.try_into().map_err(|_| {
            HashError::InvalidInput(format!(
                "hash must be {} bytes, got {}",
                HASH_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Validates and parses a hash string that must already be in canonical form.
    ///
    /// Uppercase hex is rejected rather than normalised, so that a hash has exactly one
    /// textual spelling and therefore exactly one on-disk location.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::InvalidInput`] if `input` is not 64 lowercase hex characters.
    pub fn parse(input: &str) -> HashResult<Self> {
        if !Self::is_canonical(input) {
            return Err(HashError::InvalidInput(format!(
                "hash must be 64 lowercase hex characters, got: '{}'",
                input
            )));
        }
        let mut bytes = [0u8; HASH_LEN];
        hex::decode_to_slice(input, &mut bytes)
            .map_err(|e| HashError::InvalidInput(format!("invalid hex '{}': {}", input, e)))?;
        Ok(Self(bytes))
    }

    /// Returns true if `input` is in canonical hash form.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == HASH_LEN * 2
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Returns the canonical lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the first `len` hex characters, handy for log lines and name suffixes.
    pub fn short(&self, len: usize) -> String {
        let mut hex = self.to_hex();
        hex.truncate(len.min(HASH_LEN * 2));
        hex
    }

    /// Returns `parent_dir/<s1>/<s2>/<hash>` where `s1`/`s2` are the first two pairs of hex
    /// characters of this hash.
    pub fn sharded_path(&self, parent_dir: &Path) -> PathBuf {
        let canonical = self.to_hex();
        let s1 = &canonical[0..2];
        let s2 = &canonical[2..4];
        parent_dir.join(s1).join(s2).join(&canonical)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentHash::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ContentHash::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Streams content through BLAKE3 and produces a [`ContentHash`].
///
/// Content is read in bounded buffers so that memory stays flat for multi-gigabyte video
/// files. A read failure aborts the whole computation; no partial digest is ever returned.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentHasher;

impl ContentHasher {
    pub fn new() -> Self {
        Self
    }

    /// Hashes everything readable from `reader` until EOF.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> HashResult<ContentHash> {
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::Io(e)),
            };
            hasher.update(&buffer[..n]);
        }
        Ok(ContentHash(*hasher.finalize().as_bytes()))
    }

    /// Opens `path` and hashes its full content.
    pub fn hash_file(&self, path: &Path) -> HashResult<ContentHash> {
        let file = File::open(path).map_err(|e| {
            HashError::Io(io::Error::new(
                e.kind(),
                format!("Failed to open {}: {}", path.display(), e),
            ))
        })?;
        self.hash_reader(BufReader::new(file))
    }

    /// Hashes an in-memory buffer.
    pub fn hash_bytes(&self, bytes: &[u8]) -> ContentHash {
        ContentHash(*blake3::hash(bytes).as_bytes())
    }
}
