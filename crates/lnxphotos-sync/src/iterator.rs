//! Asset iteration
//!
//! Produces assets in added-date descending order with the early-termination
//! predicates applied. This module is the sole place where "termination is
//! by added-date, filtering may be by created-date" is enforced: `recent`
//! and `until-found` count yielded assets in added order, while the
//! created-date window and kind filters silently drop assets without
//! touching either counter.
//!
//! Multiple album scopes are merged k-way on `added_at`, with id-level
//! de-duplication so the union of overlapping albums yields each asset once.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::FixedOffset;
use tracing::debug;

use lnxphotos_core::config::FilterConfig;
use lnxphotos_core::domain::{Asset, AssetId, AssetKind};
use lnxphotos_core::error::SyncError;
use lnxphotos_core::ports::{FetchScope, IPhotoService, PageCursor};

/// One scope being merged: buffered page plus continuation cursor.
struct ScopeHead {
    scope: FetchScope,
    buffer: VecDeque<Asset>,
    cursor: Option<PageCursor>,
    exhausted: bool,
    started: bool,
}

/// Lazy, finite, non-restartable asset sequence for one pass.
pub struct AssetIterator {
    service: Arc<dyn IPhotoService>,
    heads: Vec<ScopeHead>,
    filters: FilterConfig,
    fallback_offset: FixedOffset,
    seen: HashSet<AssetId>,
    yielded: u64,
    existing_streak: u64,
    stopped: bool,
}

impl AssetIterator {
    pub fn new(
        service: Arc<dyn IPhotoService>,
        scopes: Vec<FetchScope>,
        filters: FilterConfig,
        fallback_offset: FixedOffset,
    ) -> Self {
        let heads = scopes
            .into_iter()
            .map(|scope| ScopeHead {
                scope,
                buffer: VecDeque::new(),
                cursor: None,
                exhausted: false,
                started: false,
            })
            .collect();

        Self {
            service,
            heads,
            filters,
            fallback_offset,
            seen: HashSet::new(),
            yielded: 0,
            existing_streak: 0,
            stopped: false,
        }
    }

    /// Number of assets yielded so far.
    #[must_use]
    pub fn yielded(&self) -> u64 {
        self.yielded
    }

    /// Next asset in added-date descending order, or `None` when the
    /// sequence is finished (sources exhausted or a terminator fired).
    pub async fn next(&mut self) -> Result<Option<Asset>, SyncError> {
        loop {
            if self.stopped {
                return Ok(None);
            }
            if let Some(limit) = self.filters.recent {
                if self.yielded >= limit {
                    debug!(limit, "Recent limit reached, stopping iteration");
                    return Ok(None);
                }
            }

            self.refill_heads().await?;

            let Some(head_idx) = self.newest_head() else {
                return Ok(None);
            };
            let Some(asset) = self.heads[head_idx].buffer.pop_front() else {
                continue;
            };

            // Union semantics across overlapping albums
            if !self.seen.insert(asset.id().clone()) {
                continue;
            }

            if !self.passes_filters(&asset) {
                continue;
            }

            self.yielded += 1;
            return Ok(Some(asset));
        }
    }

    /// Feedback from the reconciliation engine for `until-found`: whether
    /// every rendition of the last yielded asset was already present.
    /// Filtered assets never reach this method, so the consecutive counter
    /// only moves on yielded assets.
    pub fn record_outcome(&mut self, all_existing: bool) {
        let Some(threshold) = self.filters.until_found else {
            return;
        };

        if all_existing {
            self.existing_streak += 1;
            if self.existing_streak >= threshold {
                debug!(
                    threshold,
                    "Until-found threshold reached, stopping iteration"
                );
                self.stopped = true;
            }
        } else {
            self.existing_streak = 0;
        }
    }

    /// Fetches a page for every head whose buffer ran dry.
    async fn refill_heads(&mut self) -> Result<(), SyncError> {
        for head in &mut self.heads {
            if head.exhausted || !head.buffer.is_empty() {
                continue;
            }
            if head.started && head.cursor.is_none() {
                head.exhausted = true;
                continue;
            }

            let page = self
                .service
                .fetch_page(&head.scope, head.cursor.as_ref())
                .await?;
            head.started = true;
            head.buffer.extend(page.assets);
            head.cursor = page.cursor;
            if head.buffer.is_empty() && head.cursor.is_none() {
                head.exhausted = true;
            }
        }
        Ok(())
    }

    /// Index of the head whose front asset has the newest added-date.
    fn newest_head(&self) -> Option<usize> {
        self.heads
            .iter()
            .enumerate()
            .filter_map(|(idx, head)| head.buffer.front().map(|a| (idx, a.added_at())))
            .max_by_key(|&(_, added)| added)
            .map(|(idx, _)| idx)
    }

    /// Kind and created-date filters. These drop assets without affecting
    /// `recent` or the until-found streak.
    fn passes_filters(&self, asset: &Asset) -> bool {
        asset_passes_filters(asset, &self.filters, self.fallback_offset)
    }
}

/// Active-filter check shared by the iterator and the deletion scans: an
/// asset that fails any filter is invisible to reconciliation and must
/// never be considered for deletion on either side.
pub fn asset_passes_filters(
    asset: &Asset,
    filters: &FilterConfig,
    fallback_offset: FixedOffset,
) -> bool {
    match asset.kind() {
        AssetKind::Video if filters.skip_videos => return false,
        AssetKind::Photo if filters.skip_photos => return false,
        AssetKind::Live if filters.skip_photos || filters.skip_live_photos => {
            return false;
        }
        _ => {}
    }

    if filters.skip_created_before.is_some() || filters.skip_created_after.is_some() {
        let created = asset
            .captured_at()
            .map(|c| c.resolve_utc(fallback_offset))
            .unwrap_or_else(|| asset.added_at());

        if let Some(before) = filters.skip_created_before {
            if created < before {
                return false;
            }
        }
        if let Some(after) = filters.skip_created_after {
            if created > after {
                return false;
            }
        }
    }

    true
}
