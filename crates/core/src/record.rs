use ark_hash::ContentHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One archived file.
///
/// `hash` is the record's identity and never changes. `created_at` is the capture time that
/// decided the dated directory; `imported_at` is set once, when the record is first stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub hash: ContentHash,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub imported_at: Option<DateTime<Utc>>,
}

impl MediaRecord {
    pub fn new(hash: ContentHash, path: PathBuf, created_at: DateTime<Utc>) -> Self {
        Self {
            hash,
            path,
            created_at,
            imported_at: None,
        }
    }

    pub fn imported(mut self, at: DateTime<Utc>) -> Self {
        self.imported_at = Some(at);
        self
    }
}
