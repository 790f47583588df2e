//! Ark file handling
//!
//! Filesystem concerns on both sides of an import:
//!
//! - **Client**: [`DirectoryWalker`] finds media under a source tree and hashes it
//! - **Server**: [`ArchivePlacer`] files received content into the dated archive tree
//!
//! ## Archive layout
//!
//! ```text
//! <archive_root>/
//! ├── tmp/              # in-flight uploads, same filesystem as the archive
//! └── 2023/
//!     └── 06/
//!         └── 15/
//!             └── IMG_0001.CR2
//! ```
//!
//! Content only becomes visible under a dated directory through a rename from `tmp/`, so a
//! partially written file is never observable at its final path.
//!
//! ## Example Usage
//!
//! ```no_run
//! use ark_files::DirectoryWalker;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let walker = DirectoryWalker::new(["jpg", "cr2"]);
//! let items = walker.walk(Path::new("/media/card"))?;
//! while let Ok(item) = items.recv_blocking() {
//!     let candidate = item?;
//!     println!("{} {}", candidate.hash, candidate.path.display());
//! }
//! # Ok(())
//! # }
//! ```

mod placer;
mod walk;

pub use placer::{ArchivePlacer, DateSource, Placement, TMP_DIR_NAME};
pub use walk::{DirectoryWalker, MediaCandidate, WalkItem};

/// Errors that can occur during file operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// A client-supplied file name cannot be used inside the archive
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    /// Path validation failed (outside the archive root)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Directory traversal failed
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Hashing a candidate failed
    #[error("Hash error: {0}")]
    Hash(#[from] ark_hash::HashError),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FilesResult<T> = Result<T, FilesError>;

/// Wraps an I/O error with a description of what was being attempted.
pub(crate) fn io_context(e: std::io::Error, what: impl std::fmt::Display) -> FilesError {
    FilesError::Io(std::io::Error::new(e.kind(), format!("{}: {}", what, e)))
}
