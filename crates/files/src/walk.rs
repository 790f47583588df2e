//! Source tree walker.
//!
//! The walker runs on its own OS thread and publishes candidates into a bounded
//! multi-consumer channel. Hashing happens on that thread, one file at a time; consumers
//! parallelise whatever they do with a candidate once they receive it.
//!
//! The sequence is lazy, single-pass and finite. On the first traversal or hashing error the
//! walker sends that error as the final item and stops.

use crate::{io_context, FilesError, FilesResult};
use ark_hash::{ContentHash, ContentHasher};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread;
use walkdir::WalkDir;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// A file found under the source tree whose extension is recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCandidate {
    pub path: PathBuf,
    pub hash: ContentHash,
    pub size: u64,
    /// Filesystem modification time, sent to the server as the fallback capture time.
    pub modified_at: DateTime<Utc>,
}

/// One item of a walk: a candidate, or the error that ended the walk.
pub type WalkItem = FilesResult<MediaCandidate>;

/// Finds and hashes media files under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    extensions: HashSet<String>,
    capacity: usize,
    hasher: ContentHasher,
}

impl DirectoryWalker {
    /// Creates a walker matching `extensions` case-insensitively (leading dots are optional).
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Self {
            extensions,
            capacity: DEFAULT_CHANNEL_CAPACITY,
            hasher: ContentHasher::new(),
        }
    }

    /// Sets how many hashed candidates may wait in the channel before the walker blocks.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    /// Starts walking `root` on a background thread and returns the receiving end.
    ///
    /// The channel closes when the walk finishes, after an error item, or once every receiver
    /// has been dropped.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::Io`] if the walker thread cannot be spawned.
    pub fn walk(&self, root: &Path) -> FilesResult<async_channel::Receiver<WalkItem>> {
        self.spawn(root).map(|(rx, _)| rx)
    }

    /// Like [`walk`](Self::walk), also returning the thread, which yields the number of
    /// candidates delivered.
    fn spawn(
        &self,
        root: &Path,
    ) -> FilesResult<(async_channel::Receiver<WalkItem>, thread::JoinHandle<usize>)> {
        let (tx, rx) = async_channel::bounded(self.capacity);
        let walker = self.clone();
        let root = root.to_path_buf();

        let handle = thread::Builder::new()
            .name("ark-walker".into())
            .spawn(move || walker.run(&root, &tx))
            .map_err(|e| io_context(e, "Failed to spawn walker thread"))?;

        Ok((rx, handle))
    }

    fn run(&self, root: &Path, tx: &async_channel::Sender<WalkItem>) -> usize {
        tracing::debug!(root = %root.display(), "walk started");
        let mut emitted = 0usize;

        for entry in WalkDir::new(root) {
            let item = match entry {
                Ok(entry) if entry.file_type().is_dir() => continue,
                Ok(entry) if !self.matches(entry.path()) => continue,
                Ok(entry) => self.inspect(entry.path()),
                Err(e) => Err(FilesError::Walk(e)),
            };

            let failed = item.is_err();
            if tx.send_blocking(item).is_err() {
                tracing::debug!(emitted, "all receivers dropped, stopping walk");
                return emitted;
            }
            if failed {
                tracing::debug!(emitted, "walk aborted on error");
                return emitted;
            }
            emitted += 1;
        }

        tracing::debug!(emitted, "walk finished");
        emitted
    }

    fn inspect(&self, path: &Path) -> WalkItem {
        let metadata = std::fs::metadata(path)
            .map_err(|e| io_context(e, format!("Failed to stat {}", path.display())))?;
        let modified_at = metadata
            .modified()
            .map_err(|e| io_context(e, format!("Failed to read mtime of {}", path.display())))?;
        let hash = self.hasher.hash_file(path)?;

        Ok(MediaCandidate {
            path: path.to_path_buf(),
            hash,
            size: metadata.len(),
            modified_at: DateTime::<Utc>::from(modified_at),
        })
    }
}
