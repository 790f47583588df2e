//! Media record storage.
//!
//! The ingest path only needs three operations from storage: look a record up by hash, store a
//! new record, and close. [`Repository`] captures exactly that so the server can run against
//! an in-memory map in tests and a durable store in production.
//!
//! ## Backends
//!
//! - [`MemoryRepository`]: process-local map, lost on restart
//! - [`JsonRepository`]: one JSON file per record under a hash-sharded directory tree

mod json;
mod memory;

pub use json::JsonRepository;
pub use memory::MemoryRepository;

use crate::config::{CoreConfig, RepositoryKind};
use crate::{MediaRecord, RepositoryResult};
use ark_hash::ContentHash;
use std::sync::Arc;

/// Keyed storage of [`MediaRecord`]s, at most one per hash.
///
/// Implementations are shared across concurrent requests and must be `Send + Sync`.
pub trait Repository: Send + Sync {
    /// Returns the record for `hash`, or `None` if it has never been stored.
    fn get(&self, hash: &ContentHash) -> RepositoryResult<Option<MediaRecord>>;

    /// Stores a new record.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::AlreadyExists`](crate::RepositoryError::AlreadyExists) if a
    /// record with the same hash is already stored; the existing record is left untouched.
    fn store(&self, record: MediaRecord) -> RepositoryResult<()>;

    /// Releases the backend. Later calls fail with
    /// [`RepositoryError::Closed`](crate::RepositoryError::Closed).
    fn close(&self) -> RepositoryResult<()>;
}

/// Opens the repository backend selected by `config`.
pub fn open_repository(config: &CoreConfig) -> RepositoryResult<Arc<dyn Repository>> {
    match config.repository_kind() {
        RepositoryKind::Memory => {
            tracing::info!("using in-memory repository");
            Ok(Arc::new(MemoryRepository::new()))
        }
        RepositoryKind::Json => {
            tracing::info!(path = %config.records_dir().display(), "using JSON repository");
            Ok(Arc::new(JsonRepository::open(config.records_dir())?))
        }
    }
}
