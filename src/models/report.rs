//! Outcome records produced by a backup run.
//!
//! Nothing here is persisted. The latest [`RunReport`] is kept in memory
//! and served by `GET /status`.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One key that the store refused to delete inside an otherwise
/// successful request.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct KeyFailure {
    pub key: String,
    pub error: String,
}

/// A delete request that failed as a whole.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ChunkFailure {
    /// Zero-based position of the chunk in the request sequence.
    pub index: usize,
    pub keys: Vec<String>,
    pub error: String,
}

/// Result of executing a deletion set against the store.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Keys the store confirmed as deleted.
    pub deleted: Vec<String>,
    pub failed_keys: Vec<KeyFailure>,
    pub failed_chunks: Vec<ChunkFailure>,
    /// Number of delete requests issued.
    pub requests: usize,
}

impl DeleteReport {
    /// True when every requested key was confirmed deleted.
    pub fn is_clean(&self) -> bool {
        self.failed_keys.is_empty() && self.failed_chunks.is_empty()
    }

    /// Total number of keys that were not confirmed deleted.
    pub fn failed_count(&self) -> usize {
        self.failed_keys.len()
            + self
                .failed_chunks
                .iter()
                .map(|chunk| chunk.keys.len())
                .sum::<usize>()
    }
}

/// A local file the mirror could not upload.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct MirrorFailure {
    pub path: String,
    pub error: String,
}

/// Result of mirroring the local backup directory.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub uploaded: Vec<String>,
    pub skipped: usize,
    pub failed: Vec<MirrorFailure>,
    /// Set when the mirror could not run at all (e.g. missing directory).
    pub error: Option<String>,
}

impl MirrorReport {
    pub fn aborted(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    ListingFailed(String),
}

/// Everything one mirror-then-prune run did.
#[derive(Serialize, Clone, Debug)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mirror: MirrorReport,
    /// Objects returned by the listing.
    pub listed: usize,
    /// Backup groups found in the listing.
    pub groups: usize,
    pub kept: Vec<String>,
    /// Groups inside the grace window; they do not count toward `keep`.
    pub protected: Vec<String>,
    pub deletion: DeleteReport,
    pub outcome: RunOutcome,
}
