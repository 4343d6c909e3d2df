//! Credential acquisition ports
//!
//! The engine never prompts for anything itself: passwords come from an
//! ordered chain of [`ICredentialProvider`]s and two-factor codes from an
//! [`IMfaProvider`]. Console prompts, the OS keyring, the web UI, and the
//! `--password` parameter are all adapter implementations in the CLI crate.

use crate::domain::Username;
use crate::error::SyncError;

/// Port trait for password acquisition.
///
/// Providers are tried in configured order; the first one returning
/// `Some(password)` wins. A provider returning `Ok(None)` simply has
/// nothing to offer (e.g. no keyring entry yet) and is not an error.
#[async_trait::async_trait]
pub trait ICredentialProvider: Send + Sync {
    /// Short stable name used in logs ("parameter", "keyring", ...).
    fn name(&self) -> &'static str;

    /// Produces the password for the account, if this provider has one.
    async fn password(&self, username: &Username) -> Result<Option<String>, SyncError>;

    /// Offers a password that just authenticated successfully for storage,
    /// so later runs can be non-interactive. Providers that do not persist
    /// anything keep the default no-op.
    async fn remember(&self, _username: &Username, _password: &str) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Port trait for two-factor code acquisition.
#[async_trait::async_trait]
pub trait IMfaProvider: Send + Sync {
    /// Obtains a two-factor code for the account.
    ///
    /// # Errors
    /// Returns [`SyncError::MfaRequired`] when no code can be obtained
    /// (e.g. a non-interactive run with a console provider).
    async fn code(&self, username: &Username) -> Result<String, SyncError>;
}
