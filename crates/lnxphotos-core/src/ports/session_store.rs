//! Session store port
//!
//! Persists cookies and service tokens between runs so re-authentication
//! (and MFA in particular) is the exception, not the rule. The store is
//! keyed by username; two configurations of the same account share one
//! session file. Concurrent writers for the same `(directory, username)`
//! pair are undefined behavior, so implementations expose an advisory lock
//! the sync loop holds for the duration of a pass.

use serde::{Deserialize, Serialize};

use crate::domain::Username;
use crate::error::SyncError;

/// One persisted cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    /// Host the cookie was set by
    pub domain: String,
}

/// Everything needed to resume a service session without a password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub cookies: Vec<StoredCookie>,
    /// Bearer token for the service session
    pub session_token: Option<String>,
    /// Token proving this client completed MFA within the trust window
    pub trust_token: Option<String>,
    /// Auth-flow session id (echoed back during sign-in)
    pub session_id: Option<String>,
    /// Auth-flow state header (echoed back during sign-in)
    pub scnt: Option<String>,
}

impl SessionData {
    /// Returns true when there is nothing worth persisting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.session_token.is_none() && self.trust_token.is_none()
    }
}

/// Guard for the per-`(directory, username)` advisory lock. Dropping it
/// releases the lock.
pub trait ISessionLock: Send {}

/// Port trait for session persistence.
pub trait ISessionStore: Send + Sync {
    /// Loads the persisted session for the account, if any.
    fn load(&self, username: &Username) -> Result<Option<SessionData>, SyncError>;

    /// Persists the session, replacing any previous one.
    fn save(&self, username: &Username, session: &SessionData) -> Result<(), SyncError>;

    /// Removes the persisted session.
    fn clear(&self, username: &Username) -> Result<(), SyncError>;

    /// Acquires the advisory lock for this account's session files. Held
    /// for the duration of a pass; a second process targeting the same
    /// store and username blocks here instead of corrupting state.
    fn lock(&self, username: &Username) -> Result<Box<dyn ISessionLock>, SyncError>;
}
