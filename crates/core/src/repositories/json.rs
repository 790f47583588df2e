use super::Repository;
use crate::constants::RECORD_FILE_EXTENSION;
use crate::{MediaRecord, RepositoryError, RepositoryResult};
use ark_hash::ContentHash;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Durable repository storing one JSON document per record.
///
/// Records live at `<root>/<h[0..2]>/<h[2..4]>/<h>.json`. Each record is written to a
/// temporary file in its shard directory and linked into place without replacing an existing
/// file, so concurrent writers of the same hash cannot overwrite each other and readers never
/// observe a partial document.
#[derive(Debug)]
pub struct JsonRepository {
    root: PathBuf,
    closed: AtomicBool,
}

impl JsonRepository {
    /// Opens (creating if needed) a repository rooted at `root`.
    pub fn open(root: &Path) -> RepositoryResult<Self> {
        fs::create_dir_all(root).map_err(RepositoryError::DirCreation)?;
        Ok(Self {
            root: root.to_path_buf(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, hash: &ContentHash) -> PathBuf {
        hash.sharded_path(&self.root)
            .with_extension(RECORD_FILE_EXTENSION)
    }

    fn ensure_open(&self) -> RepositoryResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RepositoryError::Closed);
        }
        Ok(())
    }
}

impl Repository for JsonRepository {
    fn get(&self, hash: &ContentHash) -> RepositoryResult<Option<MediaRecord>> {
        self.ensure_open()?;
        let path = self.record_path(hash);

        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RepositoryError::FileRead(e)),
        };

        let record: MediaRecord =
            serde_json::from_slice(&contents).map_err(RepositoryError::Deserialization)?;

        if record.hash != *hash {
            return Err(RepositoryError::HashMismatch {
                path,
                expected: *hash,
                found: record.hash,
            });
        }

        Ok(Some(record))
    }

    fn store(&self, record: MediaRecord) -> RepositoryResult<()> {
        self.ensure_open()?;
        let path = self.record_path(&record.hash);
        let shard_dir = path.parent().unwrap_or(&self.root);

        fs::create_dir_all(shard_dir).map_err(RepositoryError::DirCreation)?;

        let mut file = tempfile::Builder::new()
            .prefix(".record.")
            .tempfile_in(shard_dir)
            .map_err(RepositoryError::FileWrite)?;
        serde_json::to_writer_pretty(&mut file, &record)
            .map_err(RepositoryError::Serialization)?;
        file.as_file()
            .sync_all()
            .map_err(RepositoryError::FileWrite)?;

        match file.persist_noclobber(&path) {
            Ok(_) => {
                tracing::debug!(hash = %record.hash, path = %path.display(), "record stored");
                Ok(())
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                Err(RepositoryError::AlreadyExists(record.hash))
            }
            Err(e) => Err(RepositoryError::FileWrite(e.error)),
        }
    }

    fn close(&self) -> RepositoryResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
