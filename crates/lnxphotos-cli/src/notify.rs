//! Re-authentication notifiers
//!
//! Implementations of the core's `INotifier` port. Fired only when a run
//! needs the user to re-authenticate interactively; transient errors never
//! notify.

use std::path::PathBuf;
use std::sync::Arc;

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use lnxphotos_core::config::{ReportingConfig, SmtpConfig};
use lnxphotos_core::domain::Username;
use lnxphotos_core::error::SyncError;
use lnxphotos_core::ports::{INotifier, NullNotifier};

/// Sends a short email through the configured SMTP relay.
pub struct SmtpNotifier {
    smtp: SmtpConfig,
    to: String,
    from: String,
}

impl SmtpNotifier {
    pub fn new(smtp: SmtpConfig, to: String, from: Option<String>) -> Self {
        let from = from.unwrap_or_else(|| to.clone());
        Self { smtp, to, from }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, SyncError> {
        let mut builder = if self.smtp.no_tls {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp.host)
                .map_err(|e| SyncError::Unexpected(format!("SMTP relay: {e}")))?
        };
        builder = builder.port(self.smtp.port);

        if let (Some(user), Some(pass)) = (&self.smtp.username, &self.smtp.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(builder.build())
    }
}

#[async_trait::async_trait]
impl INotifier for SmtpNotifier {
    async fn reauth_required(&self, username: &Username) -> Result<(), SyncError> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| SyncError::Config(format!("notification sender address: {e}")))?;
        let to: Mailbox = self
            .to
            .parse()
            .map_err(|e| SyncError::Config(format!("notification recipient address: {e}")))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(format!("lnxphotos: re-authentication required for {username}"))
            .body(format!(
                "The iCloud session for {username} has expired.\n\
                 Run lnxphotos interactively to sign in again.\n"
            ))
            .map_err(|e| SyncError::Unexpected(format!("notification message: {e}")))?;

        self.transport()?
            .send(message)
            .await
            .map_err(|e| SyncError::Unexpected(format!("SMTP send: {e}")))?;

        info!(%username, to = %self.to, "Sent re-authentication email");
        Ok(())
    }
}

/// Invokes a user-supplied script; the username is passed as the single
/// argument.
pub struct ScriptNotifier {
    script: PathBuf,
}

impl ScriptNotifier {
    pub fn new(script: PathBuf) -> Self {
        Self { script }
    }
}

#[async_trait::async_trait]
impl INotifier for ScriptNotifier {
    async fn reauth_required(&self, username: &Username) -> Result<(), SyncError> {
        let status = tokio::process::Command::new(&self.script)
            .arg(username.as_str())
            .status()
            .await
            .map_err(|e| SyncError::filesystem(self.script.clone(), e))?;

        if status.success() {
            info!(script = %self.script.display(), "Notification script succeeded");
            Ok(())
        } else {
            Err(SyncError::Unexpected(format!(
                "notification script exited with {status}"
            )))
        }
    }
}

/// Fans out to every configured notifier; individual failures are logged
/// and do not stop the others.
pub struct CompositeNotifier {
    notifiers: Vec<Arc<dyn INotifier>>,
}

#[async_trait::async_trait]
impl INotifier for CompositeNotifier {
    async fn reauth_required(&self, username: &Username) -> Result<(), SyncError> {
        for notifier in &self.notifiers {
            if let Err(err) = notifier.reauth_required(username).await {
                warn!(error = %err, "Notifier failed");
            }
        }
        Ok(())
    }
}

/// Builds the notifier stack for one configuration.
pub fn build_notifier(reporting: &ReportingConfig) -> Arc<dyn INotifier> {
    let mut notifiers: Vec<Arc<dyn INotifier>> = Vec::new();

    if let Some(to) = &reporting.notification_email {
        let smtp = reporting.smtp.clone().unwrap_or_default();
        notifiers.push(Arc::new(SmtpNotifier::new(
            smtp,
            to.clone(),
            reporting.notification_email_from.clone(),
        )));
    }
    if let Some(script) = &reporting.notification_script {
        notifiers.push(Arc::new(ScriptNotifier::new(script.clone())));
    }

    if notifiers.is_empty() {
        Arc::new(NullNotifier)
    } else {
        Arc::new(CompositeNotifier { notifiers })
    }
}
