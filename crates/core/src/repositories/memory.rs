use super::Repository;
use crate::{MediaRecord, RepositoryError, RepositoryResult};
use ark_hash::ContentHash;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: RwLock<HashMap<ContentHash, MediaRecord>>,
    closed: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_open(&self) -> RepositoryResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RepositoryError::Closed);
        }
        Ok(())
    }
}

impl Repository for MemoryRepository {
    fn get(&self, hash: &ContentHash) -> RepositoryResult<Option<MediaRecord>> {
        self.ensure_open()?;
        let records = self.records.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(records.get(hash).cloned())
    }

    fn store(&self, record: MediaRecord) -> RepositoryResult<()> {
        self.ensure_open()?;
        let mut records = self.records.write().map_err(|_| RepositoryError::Poisoned)?;
        if records.contains_key(&record.hash) {
            return Err(RepositoryError::AlreadyExists(record.hash));
        }
        records.insert(record.hash, record);
        Ok(())
    }

    fn close(&self) -> RepositoryResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
