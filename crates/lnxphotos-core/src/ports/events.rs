//! Engine event port
//!
//! The reconciliation engine narrates its decisions through typed events
//! instead of printing. Progress bars, the `--only-print-filenames` mode,
//! and downstream catalog plugins are all sink implementations; the engine
//! itself stays silent on stdout.

use std::path::PathBuf;

use crate::domain::{AssetId, SizeTag};

/// Per-asset and per-pass events emitted by the reconciliation engine.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetEvent {
    /// The rendition already exists locally (canonical or legacy path).
    Existed {
        asset_id: AssetId,
        size: SizeTag,
        path: PathBuf,
    },
    /// Dry-run: the rendition would be downloaded to `path`.
    WouldDownload {
        asset_id: AssetId,
        size: SizeTag,
        path: PathBuf,
    },
    /// The rendition was downloaded and published.
    Downloaded {
        asset_id: AssetId,
        size: SizeTag,
        path: PathBuf,
        bytes: u64,
        /// True when a partial file was continued instead of starting over.
        resumed: bool,
    },
    /// The asset was skipped after a per-asset error.
    Skipped { asset_id: AssetId, reason: String },
    /// Every rendition (stills and live video) of the asset is processed.
    AllSizesComplete { asset_id: AssetId },
    /// A local file was removed by the deletion planner.
    DeletedLocal { asset_id: AssetId, path: PathBuf },
    /// An asset was moved to Recently-Deleted remotely.
    DeletedRemote { asset_id: AssetId },
    /// A pass finished; counters for reporting.
    PassCompleted { summary: PassSummary },
}

/// Counters accumulated over one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassSummary {
    pub assets_seen: u64,
    pub downloaded: u64,
    pub resumed: u64,
    pub already_present: u64,
    pub skipped_errors: u64,
    pub would_download: u64,
    pub bytes_downloaded: u64,
    pub deleted_local: u64,
    pub deleted_remote: u64,
}

/// Port trait for event consumers.
///
/// Sinks must be cheap and non-blocking; the engine calls them inline from
/// its sequential loop.
pub trait IEventSink: Send + Sync {
    fn on_event(&self, event: &AssetEvent);
}

/// Sink that discards everything; useful default and test fixture.
pub struct NullEventSink;

impl IEventSink for NullEventSink {
    fn on_event(&self, _event: &AssetEvent) {}
}
