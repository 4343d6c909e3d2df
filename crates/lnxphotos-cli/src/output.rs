//! Event sinks
//!
//! Terminal-facing implementations of the engine's `IEventSink` port: a
//! progress renderer for interactive runs and the bare path printer behind
//! `--only-print-filenames`. The engine itself never touches stdout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use lnxphotos_core::config::Config;
use lnxphotos_core::ports::{AssetEvent, IEventSink};

/// Spinner-style progress rendering for interactive runs.
pub struct ProgressSink {
    bar: ProgressBar,
    downloaded: AtomicU64,
    existing: AtomicU64,
}

impl ProgressSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(120));

        Self {
            bar,
            downloaded: AtomicU64::new(0),
            existing: AtomicU64::new(0),
        }
    }

    fn refresh(&self) {
        self.bar.set_message(format!(
            "{} downloaded, {} already present",
            self.downloaded.load(Ordering::Relaxed),
            self.existing.load(Ordering::Relaxed),
        ));
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl IEventSink for ProgressSink {
    fn on_event(&self, event: &AssetEvent) {
        match event {
            AssetEvent::Downloaded { path, resumed, .. } => {
                self.downloaded.fetch_add(1, Ordering::Relaxed);
                let verb = if *resumed { "Resumed" } else { "Downloaded" };
                self.bar.println(format!("{verb} {}", path.display()));
                self.refresh();
            }
            AssetEvent::Existed { .. } => {
                self.existing.fetch_add(1, Ordering::Relaxed);
                self.refresh();
            }
            AssetEvent::WouldDownload { path, .. } => {
                self.bar.println(format!("Would download {}", path.display()));
            }
            AssetEvent::Skipped { asset_id, reason } => {
                self.bar.println(format!("Skipped {asset_id}: {reason}"));
            }
            AssetEvent::DeletedLocal { path, .. } => {
                self.bar.println(format!("Deleted {}", path.display()));
            }
            AssetEvent::DeletedRemote { asset_id } => {
                self.bar
                    .println(format!("Moved {asset_id} to Recently Deleted"));
            }
            AssetEvent::PassCompleted { summary } => {
                self.bar.finish_and_clear();
                info!(
                    assets = summary.assets_seen,
                    downloaded = summary.downloaded,
                    resumed = summary.resumed,
                    already_present = summary.already_present,
                    skipped = summary.skipped_errors,
                    deleted_local = summary.deleted_local,
                    deleted_remote = summary.deleted_remote,
                    bytes = summary.bytes_downloaded,
                    "Pass summary"
                );
            }
            AssetEvent::AllSizesComplete { .. } => {}
        }
    }
}

/// Prints target paths to stdout and nothing else
/// (`--only-print-filenames`).
pub struct FilenamePrinter;

impl IEventSink for FilenamePrinter {
    fn on_event(&self, event: &AssetEvent) {
        match event {
            AssetEvent::WouldDownload { path, .. } | AssetEvent::Existed { path, .. } => {
                println!("{}", path.display());
            }
            _ => {}
        }
    }
}

/// Chooses the sink for a configuration.
pub fn build_sink(config: &Config) -> Arc<dyn IEventSink> {
    if config.side_effects.only_print_filenames {
        Arc::new(FilenamePrinter)
    } else {
        Arc::new(ProgressSink::new())
    }
}
