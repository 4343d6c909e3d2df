//! Reconciliation engine
//!
//! The per-asset decision function at the center of the system. For every
//! asset the iterator yields, the engine composes the version selector, the
//! naming policy, the local index, and the downloader into one of four
//! outcomes per rendition: already present, download, resume, or skip.
//! Deletion is never performed inline; the engine only queues intents into
//! a [`DeletePlan`] that the deletion planner realizes after the pass.
//!
//! ## Collision handling
//!
//! Under `name-size-dedup-with-suffix`, a collision shows up either as a
//! path already claimed by a different asset earlier in the pass, or as an
//! on-disk file whose length disagrees with the rendition (remote assets
//! are immutable, so a length disagreement means a different asset). The
//! collider is materialized under its `-{byte_length}` suffix.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lnxphotos_core::config::{Config, FileMatchPolicy};
use lnxphotos_core::domain::{Asset, AssetId, LibraryId, Rendition, SizeTag};
use lnxphotos_core::error::{ErrorClass, SyncError};
use lnxphotos_core::naming::PathPlanner;
use lnxphotos_core::ports::{AssetEvent, FetchScope, IEventSink, IPhotoService, PassSummary};
use lnxphotos_core::selector::{select, Selection};

use crate::deleter::{DeletePlan, LocalDeleteIntent};
use crate::downloader::Downloader;
use crate::iterator::{asset_passes_filters, AssetIterator};
use crate::local_index::{LocalIndex, LocalState};

/// Timezone offset applied to floating capture times for this config.
#[must_use]
pub fn fallback_offset(config: &Config) -> FixedOffset {
    config
        .output
        .fallback_offset_seconds
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

/// Result of one pass over the filtered asset sequence.
#[derive(Debug)]
pub struct PassOutcome {
    pub summary: PassSummary,
    pub plan: DeletePlan,
    /// True when the pass ended through cooperative cancellation.
    pub cancelled: bool,
}

/// Per-asset reconciliation status, fed back into `until-found`.
#[derive(Debug, Clone, Copy)]
struct AssetStatus {
    all_existing: bool,
    downloaded_any: bool,
}

/// Per-target reconciliation result.
#[derive(Debug, Clone, Copy)]
struct TargetStatus {
    existing: bool,
    downloaded: bool,
}

/// Which half of a selection a target belongs to.
enum TargetKind<'a> {
    Still,
    LiveVideo { still: &'a Rendition },
}

/// Per-asset reconciliation over one account context.
pub struct ReconcileEngine {
    service: Arc<dyn IPhotoService>,
    planner: PathPlanner,
    index: LocalIndex,
    downloader: Downloader,
    sink: Arc<dyn IEventSink>,
    config: Config,
    library: LibraryId,
    cancel: CancellationToken,
}

impl ReconcileEngine {
    /// Builds the engine for one resolved configuration.
    ///
    /// # Errors
    /// Returns `SyncError::Config` when the folder template does not parse.
    pub fn new(
        service: Arc<dyn IPhotoService>,
        config: Config,
        library: LibraryId,
        sink: Arc<dyn IEventSink>,
        cancel: CancellationToken,
    ) -> Result<Self, SyncError> {
        let planner =
            PathPlanner::from_config(&config).map_err(|e| SyncError::Config(e.to_string()))?;
        let index = LocalIndex::new(&config.output.directory);
        let downloader = Downloader::new(
            service.clone(),
            index.clone(),
            config.side_effects.clone(),
            fallback_offset(&config),
            cancel.clone(),
        );

        Ok(Self {
            service,
            planner,
            index,
            downloader,
            sink,
            config,
            library,
            cancel,
        })
    }

    /// Runs one reconciliation pass over the iterator.
    pub async fn run_pass(&self, iterator: &mut AssetIterator) -> Result<PassOutcome, SyncError> {
        self.run_pass_at(Utc::now(), iterator).await
    }

    /// Pass entry point with an injectable clock for the age-based
    /// deletion mode.
    pub async fn run_pass_at(
        &self,
        now: DateTime<Utc>,
        iterator: &mut AssetIterator,
    ) -> Result<PassOutcome, SyncError> {
        let mut summary = PassSummary::default();
        let mut plan = DeletePlan::default();
        let mut claimed: HashMap<PathBuf, AssetId> = HashMap::new();
        let mut cancelled = false;

        loop {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let Some(asset) = iterator.next().await? else {
                break;
            };
            summary.assets_seen += 1;

            match self
                .reconcile_asset(&asset, &mut summary, &mut claimed)
                .await
            {
                Ok(status) => {
                    self.sink.on_event(&AssetEvent::AllSizesComplete {
                        asset_id: asset.id().clone(),
                    });
                    iterator.record_outcome(status.all_existing);
                    self.collect_delete_intents(&asset, status.downloaded_any, now, &mut plan);
                }
                Err(err) if err.class() == ErrorClass::Cancelled => {
                    cancelled = true;
                    break;
                }
                Err(err) if err.is_per_asset() => {
                    warn!(asset_id = %asset.id(), error = %err, "Skipping asset after error");
                    summary.skipped_errors += 1;
                    self.sink.on_event(&AssetEvent::Skipped {
                        asset_id: asset.id().clone(),
                        reason: err.to_string(),
                    });
                    iterator.record_outcome(false);
                }
                Err(err) => return Err(err),
            }
        }

        // The Recently-Deleted mirror scan runs after the main pass, over a
        // separately iterated album.
        if self.config.mode.auto_delete
            && !cancelled
            && !self.config.side_effects.only_print_filenames
        {
            self.collect_auto_delete_intents(&mut plan).await?;
        }

        info!(
            assets = summary.assets_seen,
            downloaded = summary.downloaded,
            already_present = summary.already_present,
            skipped = summary.skipped_errors,
            would_download = summary.would_download,
            cancelled,
            "Pass finished"
        );
        self.sink.on_event(&AssetEvent::PassCompleted {
            summary: summary.clone(),
        });

        Ok(PassOutcome {
            summary,
            plan,
            cancelled,
        })
    }

    /// Reconciles every selected rendition of one asset. Within an asset
    /// all renditions complete before the next asset begins.
    async fn reconcile_asset(
        &self,
        asset: &Asset,
        summary: &mut PassSummary,
        claimed: &mut HashMap<PathBuf, AssetId>,
    ) -> Result<AssetStatus, SyncError> {
        let selections: Vec<Selection> = select(
            asset,
            &self.config.sizes,
            self.config.filters.skip_live_photos,
        );

        let mut status = AssetStatus {
            all_existing: true,
            downloaded_any: false,
        };

        for selection in &selections {
            let target = self
                .reconcile_target(
                    asset,
                    selection.logical_size,
                    &selection.still,
                    TargetKind::Still,
                    claimed,
                    summary,
                )
                .await?;
            status.all_existing &= target.existing;
            status.downloaded_any |= target.downloaded;

            if let Some(video) = &selection.live_video {
                let target = self
                    .reconcile_target(
                        asset,
                        video.size_tag,
                        video,
                        TargetKind::LiveVideo {
                            still: &selection.still,
                        },
                        claimed,
                        summary,
                    )
                    .await?;
                status.all_existing &= target.existing;
                status.downloaded_any |= target.downloaded;
            }
        }

        Ok(status)
    }

    /// The per-rendition decision: exists / legacy / download / resume.
    async fn reconcile_target(
        &self,
        asset: &Asset,
        logical_size: SizeTag,
        rendition: &Rendition,
        kind: TargetKind<'_>,
        claimed: &mut HashMap<PathBuf, AssetId>,
        summary: &mut PassSummary,
    ) -> Result<TargetStatus, SyncError> {
        let mut admissible = self.admissible_paths(asset, logical_size, rendition, &kind)?;
        let dedup_policy =
            self.config.naming.file_match_policy == FileMatchPolicy::NameSizeDedupWithSuffix;

        // In-pass collision: the canonical path was claimed by another asset
        if dedup_policy
            && claimed
                .get(&admissible[0])
                .is_some_and(|owner| owner != asset.id())
        {
            let dedup = self.dedup_path(asset, logical_size, rendition, &kind)?;
            debug!(
                path = %dedup.display(),
                asset_id = %asset.id(),
                "Name collision within pass, using size-suffixed path"
            );
            admissible = vec![dedup];
        }

        let mut state = self.index.probe(&admissible)?;

        // On-disk collision: canonical path holds a different-length file
        if dedup_policy {
            if let LocalState::Existing { path, size } = &state {
                if *path == admissible[0] && *size != rendition.byte_length {
                    let dedup = self.dedup_path(asset, logical_size, rendition, &kind)?;
                    if dedup != admissible[0] {
                        debug!(
                            path = %dedup.display(),
                            asset_id = %asset.id(),
                            on_disk = size,
                            expected = rendition.byte_length,
                            "On-disk size disagrees, using size-suffixed path"
                        );
                        admissible = vec![dedup];
                        state = self.index.probe(&admissible)?;
                    }
                }
            }
        }

        let canonical = admissible[0].clone();
        claimed.insert(canonical.clone(), asset.id().clone());

        match state {
            LocalState::Existing { path, .. } | LocalState::LegacyAt { path } => {
                summary.already_present += 1;
                self.sink.on_event(&AssetEvent::Existed {
                    asset_id: asset.id().clone(),
                    size: logical_size,
                    path,
                });
                Ok(TargetStatus {
                    existing: true,
                    downloaded: false,
                })
            }
            LocalState::Missing | LocalState::Partial { .. } => {
                if self.config.side_effects.dry_run
                    || self.config.side_effects.only_print_filenames
                {
                    summary.would_download += 1;
                    self.sink.on_event(&AssetEvent::WouldDownload {
                        asset_id: asset.id().clone(),
                        size: logical_size,
                        path: canonical,
                    });
                    return Ok(TargetStatus {
                        existing: false,
                        downloaded: false,
                    });
                }

                let resume_from = match state {
                    LocalState::Partial { have_bytes, .. } => {
                        if have_bytes > rendition.byte_length {
                            // Oversized partial cannot belong to this rendition
                            self.index.discard_partial(&canonical)?;
                            0
                        } else {
                            have_bytes
                        }
                    }
                    _ => 0,
                };

                let downloaded = self
                    .downloader
                    .fetch(asset, rendition, &canonical, resume_from)
                    .await?;

                summary.downloaded += 1;
                summary.bytes_downloaded += downloaded.bytes;
                if downloaded.resumed {
                    summary.resumed += 1;
                }
                self.sink.on_event(&AssetEvent::Downloaded {
                    asset_id: asset.id().clone(),
                    size: logical_size,
                    path: downloaded.path,
                    bytes: downloaded.bytes,
                    resumed: downloaded.resumed,
                });

                Ok(TargetStatus {
                    existing: false,
                    downloaded: true,
                })
            }
        }
    }

    fn admissible_paths(
        &self,
        asset: &Asset,
        logical_size: SizeTag,
        rendition: &Rendition,
        kind: &TargetKind<'_>,
    ) -> Result<Vec<PathBuf>, SyncError> {
        let paths = match kind {
            TargetKind::Still => self
                .planner
                .admissible_still_paths(asset, logical_size, rendition),
            TargetKind::LiveVideo { still } => self
                .planner
                .admissible_live_video_paths(asset, logical_size, still, rendition),
        };
        paths.map_err(|e| SyncError::Config(e.to_string()))
    }

    fn dedup_path(
        &self,
        asset: &Asset,
        logical_size: SizeTag,
        rendition: &Rendition,
        kind: &TargetKind<'_>,
    ) -> Result<PathBuf, SyncError> {
        let path = match kind {
            TargetKind::Still => self.planner.dedup_still_path(asset, logical_size, rendition),
            TargetKind::LiveVideo { still } => {
                self.planner
                    .dedup_live_video_path(asset, logical_size, still, rendition)
            }
        };
        path.map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Queues remote-delete intents for the age-based modes. Only assets
    /// that passed every active filter reach this point, which is what
    /// bounds the remote deletion set.
    fn collect_delete_intents(
        &self,
        asset: &Asset,
        downloaded_any: bool,
        now: DateTime<Utc>,
        plan: &mut DeletePlan,
    ) {
        if let Some(days) = self.config.mode.keep_icloud_recent_days {
            let created = asset
                .captured_at()
                .map(|c| c.resolve_utc(fallback_offset(&self.config)))
                .unwrap_or_else(|| asset.added_at());

            if days == 0 || created < now - Duration::days(i64::from(days)) {
                plan.remote.push(asset.id().clone());
            }
        } else if self.config.mode.delete_after_download && downloaded_any {
            plan.remote.push(asset.id().clone());
        }
    }

    /// Scans the Recently-Deleted album and queues local deletions for
    /// assets whose local copy still exists under an admissible path.
    async fn collect_auto_delete_intents(&self, plan: &mut DeletePlan) -> Result<(), SyncError> {
        let scope = FetchScope::recently_deleted(self.library.clone());
        let offset = fallback_offset(&self.config);
        let mut cursor = None;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let page = self.service.fetch_page(&scope, cursor.as_ref()).await?;
            for asset in &page.assets {
                if !asset_passes_filters(asset, &self.config.filters, offset) {
                    continue;
                }

                let selections = select(
                    asset,
                    &self.config.sizes,
                    self.config.filters.skip_live_photos,
                );
                for selection in &selections {
                    self.queue_local_delete(
                        asset,
                        selection.logical_size,
                        &selection.still,
                        TargetKind::Still,
                        plan,
                    )?;
                    if let Some(video) = &selection.live_video {
                        self.queue_local_delete(
                            asset,
                            video.size_tag,
                            video,
                            TargetKind::LiveVideo {
                                still: &selection.still,
                            },
                            plan,
                        )?;
                    }
                }
            }

            cursor = page.cursor;
            if cursor.is_none() {
                break;
            }
        }

        if !plan.local.is_empty() {
            info!(
                intents = plan.local.len(),
                "Queued local deletions for Recently-Deleted assets"
            );
        }
        Ok(())
    }

    fn queue_local_delete(
        &self,
        asset: &Asset,
        logical_size: SizeTag,
        rendition: &Rendition,
        kind: TargetKind<'_>,
        plan: &mut DeletePlan,
    ) -> Result<(), SyncError> {
        let admissible = self.admissible_paths(asset, logical_size, rendition, &kind)?;
        match self.index.probe(&admissible)? {
            LocalState::Existing { path, .. } | LocalState::LegacyAt { path } => {
                // The downloader stamped the file with the asset's
                // provenance instant; the planner re-checks both length
                // and mtime against the record before removing anything
                plan.local.push(LocalDeleteIntent {
                    asset_id: asset.id().clone(),
                    path,
                    expected_len: rendition.byte_length,
                    expected_mtime: asset.provenance_utc(fallback_offset(&self.config)),
                });
            }
            LocalState::Missing | LocalState::Partial { .. } => {}
        }
        Ok(())
    }
}
