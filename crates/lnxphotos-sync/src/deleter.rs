//! Deletion planner
//!
//! Realizes the delete intents the reconciliation engine queued during a
//! pass. Intents are never acted on mid-pass: local deletions re-probe the
//! file and refuse on disagreement, remote deletions are batched moves to
//! Recently-Deleted, and empty template directories are swept afterwards.
//!
//! On session expiry mid-batch the planner returns [`SyncError::AuthExpired`]
//! with the unattempted intents still queued; the sync loop re-authenticates
//! and calls [`DeletionPlanner::realize`] once more with the same plan.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lnxphotos_core::domain::AssetId;
use lnxphotos_core::error::SyncError;
use lnxphotos_core::ports::{AssetEvent, IEventSink, IPhotoService};

use crate::local_index::{DeleteOutcome, LocalIndex};

/// Assets per Recently-Deleted move request.
const REMOTE_DELETE_BATCH: usize = 20;

/// One pending local deletion, carrying the expectations the on-disk file
/// must meet before removal: the rendition's byte length and the
/// provenance mtime the engine stamps on every published file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDeleteIntent {
    pub asset_id: AssetId,
    pub path: PathBuf,
    pub expected_len: u64,
    pub expected_mtime: DateTime<Utc>,
}

/// Intents accumulated over one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletePlan {
    pub local: Vec<LocalDeleteIntent>,
    pub remote: Vec<AssetId>,
}

impl DeletePlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }
}

/// Counters from one realization phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteStats {
    pub local_deleted: u64,
    pub remote_deleted: u64,
    /// Local intents dropped because the file disagreed with the record.
    pub conflicts: u64,
}

/// Realizes delete intents against local storage and the remote service.
pub struct DeletionPlanner {
    service: Arc<dyn IPhotoService>,
    index: LocalIndex,
    sink: Arc<dyn IEventSink>,
    dry_run: bool,
    cancel: CancellationToken,
}

impl DeletionPlanner {
    pub fn new(
        service: Arc<dyn IPhotoService>,
        index: LocalIndex,
        sink: Arc<dyn IEventSink>,
        dry_run: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            index,
            sink,
            dry_run,
            cancel,
        }
    }

    /// Realizes the plan, draining intents as they succeed so a retry after
    /// re-authentication picks up exactly where the batch failed.
    ///
    /// Cancellation discards whatever has not been attempted yet; already
    /// realized deletions are reflected in the returned stats.
    pub async fn realize(&self, plan: &mut DeletePlan) -> Result<DeleteStats, SyncError> {
        let mut stats = DeleteStats::default();

        if self.dry_run {
            for intent in &plan.local {
                info!(path = %intent.path.display(), "Would delete local file (dry run)");
            }
            for id in &plan.remote {
                info!(asset_id = %id, "Would move to Recently-Deleted (dry run)");
            }
            plan.local.clear();
            plan.remote.clear();
            return Ok(stats);
        }

        // Local deletions: re-probe and refuse on mismatch
        while let Some(intent) = plan.local.pop() {
            if self.cancel.is_cancelled() {
                debug!("Cancelled, discarding remaining local delete intents");
                plan.local.clear();
                plan.remote.clear();
                return Ok(stats);
            }

            match self
                .index
                .delete_local(&intent.path, intent.expected_len, intent.expected_mtime)?
            {
                DeleteOutcome::Deleted => {
                    stats.local_deleted += 1;
                    self.sink.on_event(&AssetEvent::DeletedLocal {
                        asset_id: intent.asset_id.clone(),
                        path: intent.path.clone(),
                    });
                }
                DeleteOutcome::Conflict { reason } => {
                    stats.conflicts += 1;
                    warn!(
                        path = %intent.path.display(),
                        %reason,
                        "Skipping local delete, file disagrees with asset record"
                    );
                }
                DeleteOutcome::AlreadyGone => {}
            }
        }

        // Remote deletions in batches
        while !plan.remote.is_empty() {
            if self.cancel.is_cancelled() {
                debug!("Cancelled, discarding remaining remote delete intents");
                plan.remote.clear();
                return Ok(stats);
            }

            let take = plan.remote.len().min(REMOTE_DELETE_BATCH);
            let batch: Vec<AssetId> = plan.remote[..take].to_vec();

            self.service.move_to_recently_deleted(&batch).await?;

            plan.remote.drain(..take);
            stats.remote_deleted += take as u64;
            for id in &batch {
                self.sink.on_event(&AssetEvent::DeletedRemote {
                    asset_id: id.clone(),
                });
            }
        }

        // Sweep directories the folder template left empty
        let removed = self.index.remove_empty_directories()?;
        if removed > 0 {
            debug!(removed, "Removed empty directories");
        }

        Ok(stats)
    }
}
