use crate::{ImportError, ImportSummary};
use ark_files::MediaCandidate;

/// Receives per-file progress from the dispatcher's workers.
///
/// Called concurrently from every worker. All methods default to doing nothing.
pub trait ImportReporter: Send + Sync {
    fn imported(&self, _candidate: &MediaCandidate) {}

    fn skipped(&self, _candidate: &MediaCandidate) {}

    fn failed(&self, _error: &ImportError) {}

    fn finished(&self, _summary: &ImportSummary) {}
}

/// Reports progress as structured log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ImportReporter for TracingReporter {
    fn imported(&self, candidate: &MediaCandidate) {
        tracing::info!(path = %candidate.path.display(), hash = %candidate.hash, size = candidate.size, "imported");
    }

    fn skipped(&self, candidate: &MediaCandidate) {
        tracing::info!(path = %candidate.path.display(), hash = %candidate.hash, "skipped duplicate");
    }

    fn failed(&self, error: &ImportError) {
        tracing::error!(%error, "worker stopped");
    }

    fn finished(&self, summary: &ImportSummary) {
        tracing::info!(
            imported = summary.imported,
            skipped = summary.skipped,
            "import finished"
        );
    }
}
