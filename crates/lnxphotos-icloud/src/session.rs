//! File-backed session store
//!
//! Persists [`SessionData`] as one JSON file per username under the cookie
//! directory, with a sibling lock file guarding against two processes
//! sharing the same `(directory, username)` pair. File names derive from
//! the username deterministically, so multiple configurations of one
//! account land on the same session.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use lnxphotos_core::domain::Username;
use lnxphotos_core::error::SyncError;
use lnxphotos_core::ports::{ISessionLock, ISessionStore, SessionData};

/// Session store rooted at one cookie directory.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    directory: PathBuf,
}

impl FileSessionStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn session_path(&self, username: &Username) -> PathBuf {
        self.directory
            .join(format!("{}.session", username.file_stem()))
    }

    fn lock_path(&self, username: &Username) -> PathBuf {
        self.directory.join(format!("{}.lock", username.file_stem()))
    }

    fn ensure_directory(&self) -> Result<(), SyncError> {
        std::fs::create_dir_all(&self.directory)
            .map_err(|e| SyncError::filesystem(self.directory.clone(), e))
    }
}

impl ISessionStore for FileSessionStore {
    fn load(&self, username: &Username) -> Result<Option<SessionData>, SyncError> {
        let path = self.session_path(username);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SyncError::filesystem(path, err)),
        };

        match serde_json::from_str(&content) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                // A corrupt session file is not fatal; a fresh sign-in
                // will replace it
                debug!(path = %path.display(), error = %err, "Unreadable session file, ignoring");
                Ok(None)
            }
        }
    }

    fn save(&self, username: &Username, session: &SessionData) -> Result<(), SyncError> {
        self.ensure_directory()?;
        let path = self.session_path(username);
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| SyncError::Unexpected(format!("session serialization failed: {e}")))?;

        // Write-then-rename keeps the file parseable under crashes
        let tmp = path.with_extension("session.tmp");
        std::fs::write(&tmp, json).map_err(|e| SyncError::filesystem(tmp.clone(), e))?;
        std::fs::rename(&tmp, &path).map_err(|e| SyncError::filesystem(path.clone(), e))?;
        debug!(path = %path.display(), "Persisted session");
        Ok(())
    }

    fn clear(&self, username: &Username) -> Result<(), SyncError> {
        let path = self.session_path(username);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SyncError::filesystem(path, err)),
        }
    }

    fn lock(&self, username: &Username) -> Result<Box<dyn ISessionLock>, SyncError> {
        self.ensure_directory()?;
        let path = self.lock_path(username);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| SyncError::filesystem(path.clone(), e))?;

        file.lock_exclusive()
            .map_err(|e| SyncError::filesystem(path.clone(), e))?;
        debug!(path = %path.display(), "Acquired session lock");

        Ok(Box::new(SessionLockGuard { file, path }))
    }
}

/// Holds the exclusive advisory lock until dropped.
struct SessionLockGuard {
    file: File,
    path: PathBuf,
}

impl ISessionLock for SessionLockGuard {}

impl Drop for SessionLockGuard {
    fn drop(&mut self) {
        if let Err(err) = fs2::FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %err, "Failed to release session lock");
        }
    }
}

/// Convenience used by tests and the web-UI provider.
pub fn session_file_name(username: &Username) -> String {
    format!("{}.session", username.file_stem())
}

/// Returns true when a session file exists for the account.
pub fn has_session_file(directory: &Path, username: &Username) -> bool {
    directory.join(session_file_name(username)).is_file()
}
