//! Content hashing and hash-sharded path utilities.
//!
//! Ark identifies every archived file by a 256-bit BLAKE3 digest of its bytes. Two files
//! with the same content share an identity regardless of their name, location or
//! timestamps, which is what the server uses to reject duplicates.
//!
//! ## Canonical hash form
//! - Length: 64
//! - Characters: `0-9` and `a-f` only
//! - Example: `af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262`
//!
//! ## Sharded layout
//! For a canonical hash `h`, record files live under:
//! `parent_dir/<h[0..2]>/<h[2..4]>/<h>`
//!
//! This keeps any single directory from accumulating millions of entries.

mod service;

pub use service::{ContentHash, ContentHasher, HASH_LEN};

/// Error type for hashing operations.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Reading the hashed content failed
    #[error("I/O error while hashing: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for hashing operations.
pub type HashResult<T> = Result<T, HashError>;
