use ark_hash::ContentHash;
use std::path::PathBuf;

/// Failures of a single upload.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("empty upload stream")]
    EmptyStream,
    #[error("expected metadata as the first frame")]
    ExpectedMetadata,
    #[error("unexpected metadata frame after upload started")]
    UnexpectedMetadata,
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("file already exists: {}", path.display())]
    Duplicate { hash: ContentHash, path: PathBuf },

    #[error("failed to receive upload: {0}")]
    Transport(String),
    #[error("total size mismatch: expected {expected}, got {received}")]
    SizeMismatch { expected: u64, received: u64 },
    #[error("failed to place file: {0}")]
    Placement(#[from] ark_files::FilesError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("background task failed: {0}")]
    Task(String),
}

impl IngestError {
    /// True if the hash already has a record.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestError::Duplicate { .. })
    }
}

impl From<IngestError> for tonic::Status {
    fn from(err: IngestError) -> Self {
        let message = err.to_string();
        match err {
            IngestError::EmptyStream
            | IngestError::ExpectedMetadata
            | IngestError::UnexpectedMetadata
            | IngestError::InvalidFrame(_)
            | IngestError::InvalidMetadata(_) => tonic::Status::invalid_argument(message),
            IngestError::Duplicate { .. } => tonic::Status::already_exists(message),
            IngestError::Transport(_)
            | IngestError::SizeMismatch { .. }
            | IngestError::Placement(_)
            | IngestError::Repository(_)
            | IngestError::Task(_) => tonic::Status::internal(message),
        }
    }
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists: {0}")]
    AlreadyExists(ContentHash),
    #[error("repository is closed")]
    Closed,
    #[error("repository lock poisoned")]
    Poisoned,
    #[error("record at {} holds hash {found}, expected {expected}", path.display())]
    HashMismatch {
        path: PathBuf,
        expected: ContentHash,
        found: ContentHash,
    },
    #[error("failed to create record directory: {0}")]
    DirCreation(std::io::Error),
    #[error("failed to write record file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read record file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize record: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize record: {0}")]
    Deserialization(serde_json::Error),
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("cannot expand '~': no home directory")]
    NoHomeDirectory,
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
