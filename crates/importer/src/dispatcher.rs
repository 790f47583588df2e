use crate::{ImportError, ImportReporter, ImportResult, TracingReporter, Uploader};
use ark_files::WalkItem;
use std::num::NonZeroUsize;
use std::ops::AddAssign;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Counts of what an import did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    /// Files the server already held.
    pub skipped: usize,
}

impl AddAssign for ImportSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.imported += rhs.imported;
        self.skipped += rhs.skipped;
    }
}

/// Number of workers used when none is configured: one per available CPU.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Fans walker output out to a fixed pool of upload workers.
pub struct UploadDispatcher<U: Uploader> {
    uploader: Arc<U>,
    workers: usize,
    reporter: Arc<dyn ImportReporter>,
    cancel: CancellationToken,
}

impl<U: Uploader> UploadDispatcher<U> {
    pub fn new(uploader: U) -> Self {
        Self {
            uploader: Arc::new(uploader),
            workers: default_workers(),
            reporter: Arc::new(TracingReporter),
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides the worker count. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ImportReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Uses `cancel` to abort in-flight uploads.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Uploads everything received on `items` and waits for every worker to finish.
    ///
    /// A worker stops at the first error it meets; the others carry on until the channel is
    /// drained. Duplicates are counted as skipped.
    ///
    /// # Errors
    ///
    /// Returns the first error any worker stopped on.
    pub async fn run(
        &self,
        items: async_channel::Receiver<WalkItem>,
    ) -> ImportResult<ImportSummary> {
        tracing::debug!(workers = self.workers, "starting upload workers");

        let mut tasks = JoinSet::new();
        for id in 0..self.workers {
            tasks.spawn(worker(
                id,
                items.clone(),
                self.uploader.clone(),
                self.reporter.clone(),
                self.cancel.clone(),
            ));
        }
        drop(items);

        let mut summary = ImportSummary::default();
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| {
                (
                    ImportSummary::default(),
                    Err(ImportError::Task(e.to_string())),
                )
            });
            summary += outcome.0;
            if let Err(e) = outcome.1 {
                self.reporter.failed(&e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                self.reporter.finished(&summary);
                Ok(summary)
            }
        }
    }
}

async fn worker<U: Uploader>(
    id: usize,
    items: async_channel::Receiver<WalkItem>,
    uploader: Arc<U>,
    reporter: Arc<dyn ImportReporter>,
    cancel: CancellationToken,
) -> (ImportSummary, ImportResult<()>) {
    let mut summary = ImportSummary::default();

    while let Ok(item) = items.recv().await {
        let candidate = match item {
            Ok(candidate) => candidate,
            Err(e) => return (summary, Err(e.into())),
        };

        match uploader.upload(&candidate, &cancel).await {
            Ok(()) => {
                summary.imported += 1;
                reporter.imported(&candidate);
            }
            Err(e) if e.is_duplicate() => {
                summary.skipped += 1;
                reporter.skipped(&candidate);
            }
            Err(e) => return (summary, Err(e)),
        }
    }

    tracing::debug!(worker = id, "channel drained");
    (summary, Ok(()))
}
