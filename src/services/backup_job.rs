//! One mirror-then-prune run, and the bookkeeping around it.
//!
//! # Flow
//! 1. Mirror the local backup directory into the store (failure is logged
//!    and the run continues)
//! 2. List every object under the prefix (failure ends the run, nothing
//!    is deleted)
//! 3. Decide which groups fall outside the retention window
//! 4. Delete their objects in batches

use crate::{
    models::report::{DeleteReport, MirrorReport, RunOutcome, RunReport},
    services::{
        mirror::mirror_directory,
        object_store::ObjectStore,
        pruner,
        retention::RetentionPolicy,
        storage_service::StorageError,
    },
};
use chrono::{DateTime, Utc};
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{Instrument, error, info, info_span, warn};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("listing backups failed: {0}")]
    Listing(#[source] StorageError),
    #[error("a backup run is already in progress")]
    Busy,
}

#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Local directory the game server writes backups into.
    pub backup_dir: PathBuf,
    pub policy: RetentionPolicy,
}

/// Runs are serialized: the scheduler and `POST /runs` never overlap.
pub struct BackupJob {
    store: Arc<dyn ObjectStore>,
    settings: JobSettings,
    run_lock: Mutex<()>,
    last_report: RwLock<Option<RunReport>>,
}

impl BackupJob {
    pub fn new(store: Arc<dyn ObjectStore>, settings: JobSettings) -> Self {
        Self {
            store,
            settings,
            run_lock: Mutex::new(()),
            last_report: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// The report of the most recent finished run, if any.
    pub async fn last_report(&self) -> Option<RunReport> {
        self.last_report.read().await.clone()
    }

    /// Run now, waiting for an in-flight run to finish first.
    pub async fn run_once(&self) -> Result<RunReport, JobError> {
        let _guard = self.run_lock.lock().await;
        self.execute().await
    }

    /// Run now unless another run holds the lock.
    pub async fn try_run_once(&self) -> Result<RunReport, JobError> {
        let _guard = self.run_lock.try_lock().map_err(|_| JobError::Busy)?;
        self.execute().await
    }

    async fn execute(&self) -> Result<RunReport, JobError> {
        let span = info_span!("backup_run", prefix = %self.settings.policy.prefix);
        let (report, listing_error) = self.run_steps(Utc::now()).instrument(span).await;

        *self.last_report.write().await = Some(report.clone());
        match listing_error {
            Some(err) => Err(JobError::Listing(err)),
            None => Ok(report),
        }
    }

    async fn run_steps(&self, started_at: DateTime<Utc>) -> (RunReport, Option<StorageError>) {
        let JobSettings { backup_dir, policy } = &self.settings;

        let mirror = match mirror_directory(&*self.store, backup_dir, &policy.prefix).await {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "mirror failed; pruning what is already remote");
                MirrorReport::aborted(err.to_string())
            }
        };

        let listing = match self.store.list_objects(&policy.prefix).await {
            Ok(listing) => listing,
            Err(err) => {
                error!(error = %err, "listing failed; skipping deletion");
                let report = RunReport {
                    started_at,
                    finished_at: Utc::now(),
                    mirror,
                    listed: 0,
                    groups: 0,
                    kept: Vec::new(),
                    protected: Vec::new(),
                    deletion: DeleteReport::default(),
                    outcome: RunOutcome::ListingFailed(err.to_string()),
                };
                return (report, Some(err));
            }
        };

        let decision = policy.decide(&listing, Utc::now());
        info!(
            listed = listing.len(),
            groups = decision.ranked.len(),
            keep = policy.keep,
            deleting = decision.deletions.len(),
            "retention decided"
        );
        if !decision.protected.is_empty() {
            info!(groups = ?decision.protected, "recent groups held back by grace window");
        }

        let deletion = pruner::delete_objects(&*self.store, &decision.deletions).await;
        if !deletion.is_clean() {
            warn!(
                failed = deletion.failed_count(),
                deleted = deletion.deleted.len(),
                "some objects were not deleted; they will be retried next run"
            );
        }

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            mirror,
            listed: listing.len(),
            groups: decision.ranked.len(),
            kept: decision.kept,
            protected: decision.protected,
            deletion,
            outcome: RunOutcome::Completed,
        };
        info!(
            deleted = report.deletion.deleted.len(),
            uploaded = report.mirror.uploaded.len(),
            "backup run finished"
        );
        (report, None)
    }
}
