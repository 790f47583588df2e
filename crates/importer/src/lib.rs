//! Ark importer
//!
//! Client side of an import: takes the candidates produced by
//! [`DirectoryWalker`](ark_files::DirectoryWalker) and streams each one to the server.
//!
//! ## Concurrency
//!
//! [`UploadDispatcher`] starts a fixed number of workers that pull from the walker's channel.
//! A worker that hits an error stops and reports it; its siblings keep draining the channel
//! until it is empty. The dispatcher returns the first error once every worker has finished.
//!
//! Uploads that the server rejects as duplicates are logged and skipped, never fatal.

mod dispatcher;
mod reporter;
mod uploader;

pub use dispatcher::{default_workers, ImportSummary, UploadDispatcher};
pub use reporter::{ImportReporter, TracingReporter};
pub use uploader::{GrpcUploader, Uploader, CHUNK_SIZE};

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The walk ended with an error
    #[error("walk failed: {0}")]
    Walk(#[from] ark_files::FilesError),

    /// The server rejected an upload
    #[error("upload of {} failed: {status}", path.display())]
    Upload {
        path: PathBuf,
        status: tonic::Status,
    },

    /// Reading a local file failed
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    #[error("failed to connect to server: {0}")]
    Connect(#[from] tonic::transport::Error),

    #[error("authentication setup failed: {0}")]
    Auth(#[from] api_shared::auth::AuthError),

    #[error("import cancelled")]
    Cancelled,

    #[error("worker task failed: {0}")]
    Task(String),
}

impl ImportError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ImportError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True if the server reported the file as already archived.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            ImportError::Upload { status, .. } if status.code() == tonic::Code::AlreadyExists
        )
    }
}

pub type ImportResult<T> = std::result::Result<T, ImportError>;
