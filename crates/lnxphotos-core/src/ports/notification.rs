//! Notification port
//!
//! Fired when a watch-mode run loses its session and needs the user to
//! re-authenticate interactively. Deliberately narrow: transient errors are
//! logged, not notified.

use crate::domain::Username;
use crate::error::SyncError;

/// Port trait for re-authentication notifications (SMTP, external script).
#[async_trait::async_trait]
pub trait INotifier: Send + Sync {
    /// Informs the user that the account needs interactive re-auth.
    async fn reauth_required(&self, username: &Username) -> Result<(), SyncError>;
}

/// No-op notifier for configurations without reporting settings.
pub struct NullNotifier;

#[async_trait::async_trait]
impl INotifier for NullNotifier {
    async fn reauth_required(&self, _username: &Username) -> Result<(), SyncError> {
        Ok(())
    }
}
