//! Local index
//!
//! Probes the filesystem for existing renditions, manages partial files,
//! and publishes completed downloads atomically. The index is the only
//! component that writes to the output tree.
//!
//! ## Partial files
//!
//! An in-progress download lives at `<target>.part` next to its final
//! location. At most one partial exists per target; publication is a
//! same-filesystem rename so a file is never visible at its final path with
//! fewer bytes than its rendition declares.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use lnxphotos_core::error::SyncError;

/// Extension appended to in-progress downloads.
const PART_SUFFIX: &str = "part";

/// What the filesystem holds for a rendition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalState {
    /// Nothing on disk, no partial either.
    Missing,
    /// A file exists at the canonical path.
    Existing { path: PathBuf, size: u64 },
    /// A partial download exists for the canonical path.
    Partial { path: PathBuf, have_bytes: u64 },
    /// A file exists at a non-canonical admissible path (older policy).
    LegacyAt { path: PathBuf },
}

/// Result of a guarded local deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The on-disk file disagrees with the asset record; nothing removed.
    Conflict { reason: String },
    /// Nothing at the path.
    AlreadyGone,
}

/// Filesystem side of reconciliation, rooted at one output directory.
#[derive(Debug, Clone)]
pub struct LocalIndex {
    root: PathBuf,
}

impl LocalIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Derives the partial path for a target.
    #[must_use]
    pub fn part_path(target: &Path) -> PathBuf {
        let mut name = target.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(PART_SUFFIX);
        target.with_file_name(name)
    }

    /// Probes the admissible paths for a rendition.
    ///
    /// Order of precedence: a file at the canonical path wins, then any
    /// legacy admissible path, then a partial for the canonical path.
    /// `admissible` must have the canonical path first (as produced by the
    /// naming policy).
    pub fn probe(&self, admissible: &[PathBuf]) -> Result<LocalState, SyncError> {
        let Some(canonical) = admissible.first() else {
            return Ok(LocalState::Missing);
        };

        match std::fs::metadata(canonical) {
            Ok(meta) if meta.is_file() => {
                return Ok(LocalState::Existing {
                    path: canonical.clone(),
                    size: meta.len(),
                });
            }
            Ok(_) => {
                // A directory squatting on the target path is a per-asset error
                return Err(SyncError::filesystem(
                    canonical.clone(),
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "target path is a directory",
                    ),
                ));
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(SyncError::filesystem(canonical.clone(), err)),
        }

        for legacy in &admissible[1..] {
            match std::fs::metadata(legacy) {
                Ok(meta) if meta.is_file() => {
                    return Ok(LocalState::LegacyAt {
                        path: legacy.clone(),
                    });
                }
                Ok(_) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(SyncError::filesystem(legacy.clone(), err)),
            }
        }

        let part = Self::part_path(canonical);
        match std::fs::metadata(&part) {
            Ok(meta) if meta.is_file() => Ok(LocalState::Partial {
                path: canonical.clone(),
                have_bytes: meta.len(),
            }),
            Ok(_) => Ok(LocalState::Missing),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(LocalState::Missing),
            Err(err) => Err(SyncError::filesystem(part, err)),
        }
    }

    /// Opens (or resumes) the partial file for a target.
    ///
    /// With `resume_from > 0` the existing partial is opened for append; a
    /// partial longer than the rendition is truncated and restarted by
    /// passing `resume_from == 0`.
    pub async fn prepare_partial(
        &self,
        target: &Path,
        resume_from: u64,
        flush_stride: u64,
    ) -> Result<PartialHandle, SyncError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.classify_io(parent, e))?;
        }

        let part = Self::part_path(target);
        let file = if resume_from > 0 {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(&part)
                .await
                .map_err(|e| SyncError::filesystem(part.clone(), e))?
        } else {
            tokio::fs::File::create(&part)
                .await
                .map_err(|e| SyncError::filesystem(part.clone(), e))?
        };

        debug!(target = %target.display(), resume_from, "Prepared partial file");

        Ok(PartialHandle {
            file,
            part_path: part,
            target_path: target.to_path_buf(),
            written: resume_from,
            flush_stride,
            unflushed: 0,
        })
    }

    /// Removes the partial file for a target, if any.
    pub fn discard_partial(&self, target: &Path) -> Result<(), SyncError> {
        let part = Self::part_path(target);
        match std::fs::remove_file(&part) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SyncError::filesystem(part, err)),
        }
    }

    /// Deletes a local file, but only when the on-disk length and mtime
    /// both match the asset record. Any disagreement means the file is not
    /// the content the remote record describes (the engine stamps every
    /// published file with the asset's provenance mtime), and deletion is
    /// refused.
    pub fn delete_local(
        &self,
        path: &Path,
        expected_len: u64,
        expected_mtime: DateTime<Utc>,
    ) -> Result<DeleteOutcome, SyncError> {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DeleteOutcome::AlreadyGone);
            }
            Err(err) => return Err(SyncError::filesystem(path.to_path_buf(), err)),
        };

        if meta.len() != expected_len {
            return Ok(DeleteOutcome::Conflict {
                reason: format!(
                    "on-disk size {} differs from expected {}",
                    meta.len(),
                    expected_len
                ),
            });
        }

        let on_disk_mtime = FileTime::from_last_modification_time(&meta).unix_seconds();
        if on_disk_mtime != expected_mtime.timestamp() {
            return Ok(DeleteOutcome::Conflict {
                reason: format!(
                    "on-disk mtime {} differs from expected {}",
                    on_disk_mtime,
                    expected_mtime.timestamp()
                ),
            });
        }

        std::fs::remove_file(path).map_err(|e| SyncError::filesystem(path.to_path_buf(), e))?;
        Ok(DeleteOutcome::Deleted)
    }

    /// Removes empty directories under the root, deepest first. The root
    /// itself is never removed. Returns the number of directories removed.
    pub fn remove_empty_directories(&self) -> Result<u32, SyncError> {
        let mut removed = 0;
        let mut dirs: Vec<PathBuf> = Vec::new();
        collect_directories(&self.root, &mut dirs)
            .map_err(|e| SyncError::filesystem(self.root.clone(), e))?;

        // Deepest-first so a chain of empties collapses in one pass
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));

        for dir in dirs {
            if dir == self.root {
                continue;
            }
            match std::fs::remove_dir(&dir) {
                Ok(()) => {
                    debug!(dir = %dir.display(), "Removed empty directory");
                    removed += 1;
                }
                // Non-empty or already gone: both fine
                Err(err)
                    if err.kind() == std::io::ErrorKind::NotFound
                        || err.kind() == std::io::ErrorKind::DirectoryNotEmpty => {}
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "Could not remove directory");
                }
            }
        }

        Ok(removed)
    }

    /// Filesystem errors on the output root are fatal for the pass; below
    /// the root they only cost the current asset.
    fn classify_io(&self, path: &Path, err: std::io::Error) -> SyncError {
        if path == self.root {
            SyncError::filesystem_fatal(path.to_path_buf(), err)
        } else {
            SyncError::filesystem(path.to_path_buf(), err)
        }
    }
}

fn collect_directories(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            out.push(path.clone());
            collect_directories(&path, out)?;
        }
    }
    Ok(())
}

// ============================================================================
// PartialHandle
// ============================================================================

/// Open handle to a `.part` file being filled by the downloader.
#[derive(Debug)]
pub struct PartialHandle {
    file: tokio::fs::File,
    part_path: PathBuf,
    target_path: PathBuf,
    written: u64,
    flush_stride: u64,
    unflushed: u64,
}

impl PartialHandle {
    /// Appends a chunk, syncing to disk every `flush_stride` bytes.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), SyncError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| SyncError::filesystem(self.part_path.clone(), e))?;
        self.written += chunk.len() as u64;
        self.unflushed += chunk.len() as u64;

        if self.unflushed >= self.flush_stride {
            self.file
                .sync_data()
                .await
                .map_err(|e| SyncError::filesystem(self.part_path.clone(), e))?;
            self.unflushed = 0;
        }
        Ok(())
    }

    /// Total bytes in the partial, including any resumed prefix.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Publishes the completed file at its final path via atomic rename.
    /// On failure the partial is left in place for resume.
    pub async fn publish(self) -> Result<PathBuf, SyncError> {
        self.file
            .sync_all()
            .await
            .map_err(|e| SyncError::filesystem(self.part_path.clone(), e))?;
        drop(self.file);

        tokio::fs::rename(&self.part_path, &self.target_path)
            .await
            .map_err(|e| SyncError::filesystem(self.target_path.clone(), e))?;

        debug!(path = %self.target_path.display(), "Published file");
        Ok(self.target_path)
    }

    /// Flushes and closes the handle, keeping the partial on disk for a
    /// later resume (clean-shutdown path).
    pub async fn preserve(self) -> Result<(), SyncError> {
        self.file
            .sync_all()
            .await
            .map_err(|e| SyncError::filesystem(self.part_path.clone(), e))
    }

    /// Closes the handle and removes the partial (integrity failures).
    pub async fn discard(self) -> Result<(), SyncError> {
        drop(self.file);
        match tokio::fs::remove_file(&self.part_path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SyncError::filesystem(self.part_path, err)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
