//! Resumable downloader
//!
//! Streams rendition bytes from the service into a partial file, verifies
//! the final length against the rendition's declared byte count, publishes
//! atomically through the local index, and stamps mtime provenance from the
//! asset's capture time.
//!
//! ## Retry discipline
//!
//! Transient transport errors are retried internally with jittered
//! exponential backoff, bounded by a fixed attempt budget. Everything else
//! (auth expiry, rate limiting, 404 on the signed URL) propagates to the
//! engine untouched. A length mismatch discards the partial and restarts
//! once; a second mismatch surfaces as [`SyncError::IntegrityMismatch`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use filetime::FileTime;
use futures::StreamExt;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use lnxphotos_core::config::SideEffectsConfig;
use lnxphotos_core::domain::{Asset, MediaHint, Rendition};
use lnxphotos_core::error::{ErrorClass, SyncError};
use lnxphotos_core::ports::IPhotoService;

use crate::local_index::LocalIndex;
use crate::sidecar;

/// Maximum internal attempts per rendition for transient errors.
const MAX_ATTEMPTS: u32 = 5;

/// Base delay for exponential backoff (1 second).
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Backoff cap.
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Bytes written between durability syncs of the partial file.
const DEFAULT_FLUSH_STRIDE: u64 = 8 * 1024 * 1024;

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    pub bytes: u64,
    /// True when an existing partial was continued.
    pub resumed: bool,
}

/// Streams renditions to disk for one account context.
pub struct Downloader {
    service: std::sync::Arc<dyn IPhotoService>,
    index: LocalIndex,
    side_effects: SideEffectsConfig,
    fallback_offset: FixedOffset,
    flush_stride: u64,
    cancel: CancellationToken,
}

impl Downloader {
    pub fn new(
        service: std::sync::Arc<dyn IPhotoService>,
        index: LocalIndex,
        side_effects: SideEffectsConfig,
        fallback_offset: FixedOffset,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            index,
            side_effects,
            fallback_offset,
            flush_stride: DEFAULT_FLUSH_STRIDE,
            cancel,
        }
    }

    /// Override the partial-file sync stride (tests use small strides).
    pub fn with_flush_stride(mut self, stride: u64) -> Self {
        self.flush_stride = stride.max(1);
        self
    }

    /// Downloads one rendition to `target`, resuming from `resume_from`
    /// bytes when a matching partial exists.
    ///
    /// On success the file is visible at `target` with exactly
    /// `rendition.byte_length` bytes, mtime set to the asset's capture
    /// instant (UTC), and sidecars written per configuration.
    pub async fn fetch(
        &self,
        asset: &Asset,
        rendition: &Rendition,
        target: &Path,
        resume_from: u64,
    ) -> Result<Downloaded, SyncError> {
        let mut resume = resume_from;

        // Integrity failures get exactly one fresh start.
        for integrity_attempt in 0..2 {
            match self.fetch_with_retries(rendition, target, resume).await {
                Ok(downloaded) => {
                    self.finish(asset, rendition, &downloaded.path)?;
                    return Ok(downloaded);
                }
                Err(SyncError::IntegrityMismatch { expected_len, got_len })
                    if integrity_attempt == 0 =>
                {
                    warn!(
                        target = %target.display(),
                        expected_len,
                        got_len,
                        "Length mismatch, discarding partial and restarting once"
                    );
                    self.index.discard_partial(target)?;
                    resume = 0;
                }
                Err(err) => return Err(err),
            }
        }

        // Second mismatch already returned above; loop bound makes this
        // unreachable but keeps the compiler satisfied without panicking.
        Err(SyncError::IntegrityMismatch {
            expected_len: rendition.byte_length,
            got_len: 0,
        })
    }

    /// Transient-retry wrapper around a single streaming attempt.
    async fn fetch_with_retries(
        &self,
        rendition: &Rendition,
        target: &Path,
        resume_from: u64,
    ) -> Result<Downloaded, SyncError> {
        let mut resume = resume_from;

        for attempt in 0..MAX_ATTEMPTS {
            match self.stream_once(rendition, target, resume).await {
                Ok(downloaded) => {
                    if attempt > 0 {
                        debug!(
                            target = %target.display(),
                            attempt,
                            "Download succeeded after retry"
                        );
                    }
                    return Ok(downloaded);
                }
                Err(err) if err.class() == ErrorClass::Retryable && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        target = %target.display(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient download error, retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    // Whatever made it to disk before the error is reusable
                    resume = self.current_partial_len(target);
                }
                Err(err) => return Err(err),
            }
        }

        Err(SyncError::ServiceUnavailable(format!(
            "download retries exhausted for {}",
            target.display()
        )))
    }

    /// One streaming attempt: open (or resume) the partial, consume the
    /// byte stream, verify the length, publish.
    async fn stream_once(
        &self,
        rendition: &Rendition,
        target: &Path,
        resume_from: u64,
    ) -> Result<Downloaded, SyncError> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        // A partial that already holds every byte just needs publication
        if resume_from == rendition.byte_length && resume_from > 0 {
            let handle = self
                .index
                .prepare_partial(target, resume_from, self.flush_stride)
                .await?;
            let path = handle.publish().await?;
            return Ok(Downloaded {
                path,
                bytes: resume_from,
                resumed: true,
            });
        }

        let resumed = resume_from > 0;
        let mut handle = self
            .index
            .prepare_partial(target, resume_from, self.flush_stride)
            .await?;

        let mut stream = self.service.open_rendition(rendition, resume_from).await?;

        loop {
            let chunk = tokio::select! {
                _ = self.cancel.cancelled() => {
                    // Keep the partial for the next pass
                    handle.preserve().await?;
                    return Err(SyncError::Cancelled);
                }
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => handle.write_chunk(&bytes).await?,
                Some(Err(err)) => {
                    handle.preserve().await?;
                    return Err(err);
                }
                None => break,
            }
        }

        let written = handle.written();
        if written != rendition.byte_length {
            // Over-long partials are useless; short ones are kept only to be
            // discarded by the integrity restart so state stays predictable.
            handle.discard().await?;
            return Err(SyncError::IntegrityMismatch {
                expected_len: rendition.byte_length,
                got_len: written,
            });
        }

        let path = handle.publish().await?;
        Ok(Downloaded {
            path,
            bytes: written,
            resumed,
        })
    }

    /// Post-publication effects: mtime provenance and sidecars.
    fn finish(&self, asset: &Asset, rendition: &Rendition, path: &Path) -> Result<(), SyncError> {
        let provenance = asset.provenance_utc(self.fallback_offset);
        let mtime = FileTime::from_unix_time(provenance.timestamp(), 0);
        filetime::set_file_mtime(path, mtime)
            .map_err(|e| SyncError::filesystem(path.to_path_buf(), e))?;

        if self.side_effects.set_exif_datetime && rendition.media_hint == MediaHint::Image {
            if let Some(captured) = asset.captured_at() {
                sidecar::ensure_exif_datetime(path, captured.wall_clock())?;
                // mtime again: the EXIF rewrite replaced the file
                filetime::set_file_mtime(path, mtime)
                    .map_err(|e| SyncError::filesystem(path.to_path_buf(), e))?;
            }
        }

        if self.side_effects.xmp_sidecar {
            sidecar::write_xmp_sidecar(path, asset, self.fallback_offset)?;
        }

        Ok(())
    }

    fn current_partial_len(&self, target: &Path) -> u64 {
        std::fs::metadata(LocalIndex::part_path(target))
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

/// Exponential backoff with jitter: `base * 2^attempt` capped at
/// [`MAX_DELAY`], plus up to 50% random jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_DELAY.saturating_mul(2u32.saturating_pow(attempt));
    let capped = exp.min(MAX_DELAY);
    let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 2);
    capped + Duration::from_millis(jitter_ms)
}
