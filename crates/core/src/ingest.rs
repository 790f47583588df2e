//! Streaming upload ingest.
//!
//! An upload is a sequence of [`UploadFrame`]s: exactly one [`UploadFrame::Metadata`] first,
//! then any number of [`UploadFrame::Chunk`]s. [`IngestService::ingest`] drives one upload
//! through
//!
//! ```text
//! AwaitMetadata -> (hash lock, dedup check) -> Buffering -> Validating -> Placing -> Done
//! ```
//!
//! Uploads of the same hash are serialised: a second call waits for the first to finish and
//! then repeats the dedup check, so it either sees the stored record or ingests normally.
//!
//! and fails with `InvalidArgument`, `AlreadyExists` or `Internal` class errors (see
//! [`IngestError`]). Nothing is persisted unless every step succeeds.

use crate::constants::MAX_PREALLOCATED_BYTES;
use crate::{IngestError, IngestResult, MediaRecord, Repository};
use ark_files::{ArchivePlacer, Placement};
use ark_hash::ContentHash;
use ark_types::NonEmptyText;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_stream::{Stream, StreamExt};

/// Client-declared description of an upload, as received on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetadata {
    pub hash: Vec<u8>,
    pub name: String,
    pub size: i64,
    /// Used only when the content carries no readable capture time.
    pub created_at: Option<DateTime<Utc>>,
}

/// One frame of an upload stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadFrame {
    Metadata(UploadMetadata),
    Chunk(Vec<u8>),
}

/// Metadata after validation.
#[derive(Debug, Clone)]
struct Declared {
    hash: ContentHash,
    name: NonEmptyText,
    size: u64,
    fallback: DateTime<Utc>,
}

impl TryFrom<UploadMetadata> for Declared {
    type Error = IngestError;

    fn try_from(metadata: UploadMetadata) -> Result<Self, Self::Error> {
        let hash = ContentHash::from_slice(&metadata.hash)
            .map_err(|e| IngestError::InvalidMetadata(e.to_string()))?;
        let name = NonEmptyText::new(&metadata.name)
            .map_err(|_| IngestError::InvalidMetadata("name must not be empty".into()))?;
        let size = u64::try_from(metadata.size).map_err(|_| {
            IngestError::InvalidMetadata(format!("size must not be negative, got {}", metadata.size))
        })?;

        Ok(Self {
            hash,
            name,
            size,
            fallback: metadata.created_at.unwrap_or_else(Utc::now),
        })
    }
}

/// Receives outcomes of ingest calls.
///
/// All methods default to doing nothing.
pub trait IngestObserver: Send + Sync {
    /// The upload was rejected because its hash is already archived at `existing`.
    fn duplicate(&self, _hash: &ContentHash, _existing: &Path) {}

    fn imported(&self, _record: &MediaRecord, _size: u64) {}

    /// The upload failed for a reason other than duplication. `hash` is `None` when the
    /// metadata frame was never validated.
    fn failed(&self, _hash: Option<&ContentHash>, _error: &IngestError) {}
}

/// Reports ingest outcomes as structured log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl IngestObserver for TracingObserver {
    fn duplicate(&self, hash: &ContentHash, existing: &Path) {
        tracing::info!(%hash, path = %existing.display(), "duplicate upload rejected");
    }

    fn imported(&self, record: &MediaRecord, size: u64) {
        tracing::info!(
            hash = %record.hash,
            path = %record.path.display(),
            created_at = %record.created_at,
            size,
            "file imported"
        );
    }

    fn failed(&self, hash: Option<&ContentHash>, error: &IngestError) {
        match hash {
            Some(hash) => tracing::warn!(%hash, %error, "upload failed"),
            None => tracing::warn!(%error, "upload rejected"),
        }
    }
}

type InFlight = Arc<Mutex<HashMap<ContentHash, Arc<AsyncMutex<()>>>>>;

/// Exclusive hold on one hash for the duration of an upload.
///
/// The map entry is shared by every call waiting on the same hash and is removed by the last
/// holder to leave.
struct HashLock {
    hash: ContentHash,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    in_flight: InFlight,
}

impl HashLock {
    async fn acquire(in_flight: &InFlight, hash: ContentHash) -> Self {
        let lock = {
            let mut map = in_flight.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(map.entry(hash).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        Self {
            hash,
            lock,
            guard: Some(guard),
            in_flight: Arc::clone(in_flight),
        }
    }
}

impl Drop for HashLock {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        // Only the map and this holder still reference the lock: nobody is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            map.remove(&self.hash);
        }
    }
}

/// Server-side ingest of streamed uploads.
///
/// Cheap to clone; clones share the repository, placer and per-hash locks.
#[derive(Clone)]
pub struct IngestService {
    repository: Arc<dyn Repository>,
    placer: Arc<ArchivePlacer>,
    observer: Arc<dyn IngestObserver>,
    in_flight: InFlight,
}

impl IngestService {
    pub fn new(repository: Arc<dyn Repository>, placer: ArchivePlacer) -> Self {
        Self {
            repository,
            placer: Arc::new(placer),
            observer: Arc::new(TracingObserver),
            in_flight: Arc::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn IngestObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    /// Looks up the record for `hash` without blocking the async runtime.
    pub async fn lookup(&self, hash: ContentHash) -> IngestResult<Option<MediaRecord>> {
        let repository = Arc::clone(&self.repository);
        let record = tokio::task::spawn_blocking(move || repository.get(&hash))
            .await
            .map_err(|e| IngestError::Task(e.to_string()))??;
        Ok(record)
    }

    /// Ingests one upload stream and returns the stored record.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` class: empty stream, first frame not metadata, invalid metadata,
    ///   second metadata frame, or an invalid frame yielded by `frames`
    /// - `AlreadyExists` class: hash already archived, including by a concurrent upload this
    ///   call waited for
    /// - `Internal` class: transport failure, size mismatch, placement or repository failure
    pub async fn ingest<S>(&self, mut frames: S) -> IngestResult<MediaRecord>
    where
        S: Stream<Item = IngestResult<UploadFrame>> + Unpin + Send,
    {
        let declared = match self.await_metadata(&mut frames).await {
            Ok(declared) => declared,
            Err(e) => {
                self.observer.failed(None, &e);
                return Err(e);
            }
        };

        let hash = declared.hash;
        let size = declared.size;
        let result = self.ingest_declared(declared, frames).await;
        match &result {
            Ok(record) => self.observer.imported(record, size),
            Err(IngestError::Duplicate { path, .. }) => self.observer.duplicate(&hash, path),
            Err(e) => self.observer.failed(Some(&hash), e),
        }
        result
    }

    async fn await_metadata<S>(&self, frames: &mut S) -> IngestResult<Declared>
    where
        S: Stream<Item = IngestResult<UploadFrame>> + Unpin + Send,
    {
        match frames.next().await {
            None => Err(IngestError::EmptyStream),
            Some(Err(e)) => Err(e),
            Some(Ok(UploadFrame::Chunk(_))) => Err(IngestError::ExpectedMetadata),
            Some(Ok(UploadFrame::Metadata(metadata))) => Declared::try_from(metadata),
        }
    }

    async fn ingest_declared<S>(&self, declared: Declared, mut frames: S) -> IngestResult<MediaRecord>
    where
        S: Stream<Item = IngestResult<UploadFrame>> + Unpin + Send,
    {
        let _lock = HashLock::acquire(&self.in_flight, declared.hash).await;

        if let Some(existing) = self.lookup(declared.hash).await? {
            return Err(IngestError::Duplicate {
                hash: declared.hash,
                path: existing.path,
            });
        }

        let content = receive_content(&mut frames, declared.size).await?;
        let placement = self.place(&declared, content).await?;

        let record = MediaRecord::new(declared.hash, placement.path.clone(), placement.created_at)
            .imported(Utc::now());
        self.persist(record, placement).await
    }

    async fn place(&self, declared: &Declared, content: Vec<u8>) -> IngestResult<Placement> {
        let placer = Arc::clone(&self.placer);
        let name = declared.name.clone();
        let hash = declared.hash;
        let fallback = declared.fallback;

        let placement = tokio::task::spawn_blocking(move || {
            placer.place(&content, name.as_str(), &hash, fallback)
        })
        .await
        .map_err(|e| IngestError::Task(e.to_string()))??;
        Ok(placement)
    }

    /// Stores `record`, removing the placed file again if the store fails.
    async fn persist(&self, record: MediaRecord, placement: Placement) -> IngestResult<MediaRecord> {
        let repository = Arc::clone(&self.repository);
        let placer = Arc::clone(&self.placer);
        let stored = record.clone();

        let result = tokio::task::spawn_blocking(move || match repository.store(stored) {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Err(cleanup) = placer.remove(&placement.path) {
                    tracing::error!(
                        path = %placement.path.display(),
                        error = %cleanup,
                        "failed to remove placed file after store failure"
                    );
                }
                Err(IngestError::Repository(e))
            }
        })
        .await
        .map_err(|e| IngestError::Task(e.to_string()))?;

        result.map(|()| record)
    }
}

/// Buffers chunk frames until the stream ends, enforcing the declared size.
async fn receive_content<S>(frames: &mut S, declared: u64) -> IngestResult<Vec<u8>>
where
    S: Stream<Item = IngestResult<UploadFrame>> + Unpin + Send,
{
    let capacity = usize::try_from(declared)
        .unwrap_or(usize::MAX)
        .min(MAX_PREALLOCATED_BYTES);
    let mut content = Vec::with_capacity(capacity);
    let mut received: u64 = 0;

    while let Some(frame) = frames.next().await {
        match frame? {
            UploadFrame::Chunk(data) => {
                received += data.len() as u64;
                if received > declared {
                    return Err(IngestError::SizeMismatch {
                        expected: declared,
                        received,
                    });
                }
                content.extend_from_slice(&data);
            }
            UploadFrame::Metadata(_) => return Err(IngestError::UnexpectedMetadata),
        }
    }

    if received != declared {
        return Err(IngestError::SizeMismatch {
            expected: declared,
            received,
        });
    }

    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryRepository, RepositoryError, RepositoryResult};
    use ark_hash::ContentHasher;
    use chrono::TimeZone;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        repository: Arc<MemoryRepository>,
        service: IngestService,
        observer: Arc<CountingObserver>,
    }

    #[derive(Default)]
    struct CountingObserver {
        duplicates: AtomicUsize,
        imported: AtomicUsize,
        failed: AtomicUsize,
    }

    impl IngestObserver for CountingObserver {
        fn duplicate(&self, _hash: &ContentHash, _existing: &Path) {
            self.duplicates.fetch_add(1, Ordering::SeqCst);
        }
        fn imported(&self, _record: &MediaRecord, _size: u64) {
            self.imported.fetch_add(1, Ordering::SeqCst);
        }
        fn failed(&self, _hash: Option<&ContentHash>, _error: &IngestError) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let repository = Arc::new(MemoryRepository::new());
        let observer = Arc::new(CountingObserver::default());
        let placer = ArchivePlacer::new(temp.path()).unwrap();
        let service = IngestService::new(repository.clone(), placer).with_observer(observer.clone());
        Fixture {
            _temp: temp,
            repository,
            service,
            observer,
        }
    }

    fn fallback() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap()
    }

    fn metadata(content: &[u8], name: &str) -> UploadFrame {
        UploadFrame::Metadata(UploadMetadata {
            hash: ContentHasher::new().hash_bytes(content).as_bytes().to_vec(),
            name: name.to_string(),
            size: content.len() as i64,
            created_at: Some(fallback()),
        })
    }

    fn upload(content: &[u8], name: &str, chunk: usize) -> Vec<IngestResult<UploadFrame>> {
        let mut frames = vec![Ok(metadata(content, name))];
        frames.extend(
            content
                .chunks(chunk)
                .map(|c| Ok(UploadFrame::Chunk(c.to_vec()))),
        );
        frames
    }

    fn stream(
        frames: Vec<IngestResult<UploadFrame>>,
    ) -> impl Stream<Item = IngestResult<UploadFrame>> + Unpin + Send {
        tokio_stream::iter(frames)
    }

    #[tokio::test]
    async fn test_ingest_places_and_stores() {
        let f = fixture();
        let content = b"some video bytes";

        let record = f
            .service
            .ingest(stream(upload(content, "clip.mp4", 4)))
            .await
            .unwrap();

        assert!(record.path.ends_with("2021/03/04/clip.mp4"));
        assert_eq!(fs::read(&record.path).unwrap(), content);
        assert_eq!(record.created_at, fallback());
        assert!(record.imported_at.is_some());
        assert_eq!(f.repository.get(&record.hash).unwrap(), Some(record));
        assert_eq!(f.observer.imported.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ingest_zero_byte_file() {
        let f = fixture();
        let record = f
            .service
            .ingest(stream(upload(b"", "empty.mov", 4)))
            .await
            .unwrap();
        assert_eq!(fs::read(&record.path).unwrap(), b"");
    }

    #[tokio::test]
    async fn test_duplicate_reports_existing_path_without_reading_payload() {
        let f = fixture();
        let content = b"doge";
        let first = f
            .service
            .ingest(stream(upload(content, "doge.jpg", 2)))
            .await
            .unwrap();

        // The payload frame is an error; a duplicate must be rejected before reaching it.
        let frames = vec![
            Ok(metadata(content, "same-doge.jpg")),
            Err(IngestError::Transport("must not be read".into())),
        ];
        let err = f.service.ingest(stream(frames)).await.unwrap_err();

        match err {
            IngestError::Duplicate { path, .. } => assert_eq!(path, first.path),
            other => panic!("expected duplicate, got {other:?}"),
        }
        assert_eq!(f.repository.len(), 1);
        assert_eq!(f.observer.duplicates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_stream_is_invalid() {
        let f = fixture();
        let err = f.service.ingest(stream(vec![])).await.unwrap_err();
        assert!(matches!(err, IngestError::EmptyStream));
        assert_eq!(f.observer.failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_frame_must_be_metadata() {
        let f = fixture();
        let frames = vec![Ok(UploadFrame::Chunk(b"data".to_vec()))];
        let err = f.service.ingest(stream(frames)).await.unwrap_err();
        assert!(matches!(err, IngestError::ExpectedMetadata));
    }

    #[tokio::test]
    async fn test_invalid_metadata() {
        let f = fixture();
        let bad = [
            UploadMetadata {
                hash: vec![1; 16],
                name: "a.jpg".into(),
                size: 1,
                created_at: None,
            },
            UploadMetadata {
                hash: vec![1; 32],
                name: "  ".into(),
                size: 1,
                created_at: None,
            },
            UploadMetadata {
                hash: vec![1; 32],
                name: "a.jpg".into(),
                size: -1,
                created_at: None,
            },
        ];

        for metadata in bad {
            let frames = vec![Ok(UploadFrame::Metadata(metadata))];
            let err = f.service.ingest(stream(frames)).await.unwrap_err();
            assert!(matches!(err, IngestError::InvalidMetadata(_)), "{err:?}");
        }
        assert!(f.repository.is_empty());
    }

    #[tokio::test]
    async fn test_second_metadata_frame_is_rejected() {
        let f = fixture();
        let content = b"abc";
        let frames = vec![
            Ok(metadata(content, "a.mov")),
            Ok(UploadFrame::Chunk(b"ab".to_vec())),
            Ok(metadata(content, "a.mov")),
        ];

        let err = f.service.ingest(stream(frames)).await.unwrap_err();
        assert!(matches!(err, IngestError::UnexpectedMetadata));
        assert!(f.repository.is_empty());
    }

    #[tokio::test]
    async fn test_size_mismatch_persists_nothing() {
        let f = fixture();
        let content = b"abcdef";

        let short = vec![
            Ok(metadata(content, "a.mov")),
            Ok(UploadFrame::Chunk(b"abc".to_vec())),
        ];
        let err = f.service.ingest(stream(short)).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::SizeMismatch {
                expected: 6,
                received: 3
            }
        ));

        let long = vec![
            Ok(metadata(content, "a.mov")),
            Ok(UploadFrame::Chunk(b"abcdefg".to_vec())),
        ];
        let err = f.service.ingest(stream(long)).await.unwrap_err();
        assert!(matches!(err, IngestError::SizeMismatch { .. }));

        assert!(f.repository.is_empty());
        let archive = f.service.placer.root().to_path_buf();
        let entries: Vec<_> = fs::read_dir(&archive)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("tmp")]);
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream() {
        let f = fixture();
        let frames = vec![
            Ok(metadata(b"abc", "a.mov")),
            Ok(UploadFrame::Chunk(b"a".to_vec())),
            Err(IngestError::Transport("connection reset".into())),
        ];
        let err = f.service.ingest(stream(frames)).await.unwrap_err();
        assert!(matches!(err, IngestError::Transport(_)));
        assert_eq!(
            tonic::Status::from(err).code(),
            tonic::Code::Internal
        );
    }

    #[tokio::test]
    async fn test_hash_lock_released_after_failure() {
        let f = fixture();
        let content = b"retry me";
        let failed = vec![Ok(metadata(content, "a.mov"))];
        assert!(f.service.ingest(stream(failed)).await.is_err());

        f.service
            .ingest(stream(upload(content, "a.mov", 3)))
            .await
            .unwrap();
    }

    /// Starts an upload of `content` that sends its metadata and then waits for `tx`.
    async fn held_upload(
        f: &Fixture,
        content: &[u8],
    ) -> (
        tokio::sync::mpsc::Sender<IngestResult<UploadFrame>>,
        tokio::task::JoinHandle<IngestResult<MediaRecord>>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        tx.send(Ok(metadata(content, "a.mov"))).await.unwrap();

        let service = f.service.clone();
        let handle = tokio::spawn(async move {
            service
                .ingest(tokio_stream::wrappers::ReceiverStream::new(rx))
                .await
        });

        let hash = ContentHasher::new().hash_bytes(content);
        while !f.service.in_flight.lock().unwrap().contains_key(&hash) {
            tokio::task::yield_now().await;
        }
        (tx, handle)
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_concurrent_same_hash_waits_then_reports_duplicate() {
        let f = fixture();
        let content = b"concurrent".to_vec();
        let (tx, first) = held_upload(&f, &content).await;

        let second = {
            let service = f.service.clone();
            let frames = upload(&content, "b.mov", 4);
            tokio::spawn(async move { service.ingest(stream(frames)).await })
        };
        settle().await;
        assert!(!second.is_finished());

        tx.send(Ok(UploadFrame::Chunk(content.clone()))).await.unwrap();
        drop(tx);
        let stored = first.await.unwrap().unwrap();

        match second.await.unwrap().unwrap_err() {
            IngestError::Duplicate { path, .. } => assert_eq!(path, stored.path),
            other => panic!("expected duplicate, got {other:?}"),
        }
        assert_eq!(f.repository.len(), 1);
        assert!(f.service.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_waiting_upload_imports_when_first_fails() {
        let f = fixture();
        let content = b"first one drops".to_vec();
        let (tx, first) = held_upload(&f, &content).await;

        let second = {
            let service = f.service.clone();
            let frames = upload(&content, "b.mov", 4);
            tokio::spawn(async move { service.ingest(stream(frames)).await })
        };
        settle().await;
        assert!(!second.is_finished());

        tx.send(Err(IngestError::Transport("connection reset".into())))
            .await
            .unwrap();
        drop(tx);
        assert!(matches!(
            first.await.unwrap(),
            Err(IngestError::Transport(_))
        ));

        let record = second.await.unwrap().unwrap();
        assert!(record.path.ends_with("2021/03/04/b.mov"));
        assert_eq!(fs::read(&record.path).unwrap(), content);
        assert_eq!(f.repository.len(), 1);
        assert!(f.service.in_flight.lock().unwrap().is_empty());
    }

    struct FailingRepository;

    impl Repository for FailingRepository {
        fn get(&self, _hash: &ContentHash) -> RepositoryResult<Option<MediaRecord>> {
            Ok(None)
        }
        fn store(&self, _record: MediaRecord) -> RepositoryResult<()> {
            Err(RepositoryError::FileWrite(std::io::Error::other("disk full")))
        }
        fn close(&self) -> RepositoryResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_failure_removes_placed_file() {
        let temp = TempDir::new().unwrap();
        let placer = ArchivePlacer::new(temp.path()).unwrap();
        let service = IngestService::new(Arc::new(FailingRepository), placer);

        let err = service
            .ingest(stream(upload(b"abc", "a.mov", 2)))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Repository(_)));
        assert!(!service.placer.root().join("2021/03/04/a.mov").exists());
    }

    #[tokio::test]
    async fn test_missing_created_at_falls_back_to_now() {
        let f = fixture();
        let content = b"undated";
        let frames = vec![
            Ok(UploadFrame::Metadata(UploadMetadata {
                hash: ContentHasher::new().hash_bytes(content).as_bytes().to_vec(),
                name: "undated.mov".into(),
                size: content.len() as i64,
                created_at: None,
            })),
            Ok(UploadFrame::Chunk(content.to_vec())),
        ];

        let before = Utc::now();
        let record = f.service.ingest(stream(frames)).await.unwrap();
        assert!(record.created_at >= before);
    }
}
