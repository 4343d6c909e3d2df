//! Multi-account driver
//!
//! Builds a full context (transport client, session store, credential
//! chain, notifiers, event sink) per resolved configuration and runs the
//! configurations in sequence. A fatal error in one configuration does not
//! stop the others; a process-level fatal (unusable output directory
//! root) does.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lnxphotos_core::config::{Config, MfaProviderKind, PasswordProviderKind};
use lnxphotos_core::error::SyncError;
use lnxphotos_core::ports::{ICredentialProvider, IMfaProvider};
use lnxphotos_icloud::{FileSessionStore, ICloudClient, DEFAULT_TIMEOUT};
use lnxphotos_sync::{LoopHandles, RunStats, SyncLoop};

use crate::credentials::{ConsoleProvider, KeyringProvider, ParameterProvider, WebUiProvider};
use crate::notify::build_notifier;
use crate::output::build_sink;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

/// Runs every configuration in order and returns the process exit code.
pub async fn run_accounts(configs: Vec<Config>, cancel: CancellationToken) -> i32 {
    let mut exit = EXIT_OK;

    for config in configs {
        if cancel.is_cancelled() {
            break;
        }

        let username = config.auth.username.clone();
        let directory = config.output.directory.clone();
        info!(%username, directory = %directory.display(), "Starting account run");

        match run_account(config, cancel.clone()).await {
            Ok(stats) => {
                info!(
                    %username,
                    passes = stats.passes,
                    downloaded = stats.downloaded,
                    already_present = stats.already_present,
                    deleted_local = stats.deleted_local,
                    deleted_remote = stats.deleted_remote,
                    cancelled = stats.cancelled,
                    "Account run finished"
                );
                if stats.cancelled {
                    break;
                }
            }
            Err(err) => {
                error!(%username, error = %err, "Account run failed");
                exit = EXIT_FATAL;

                // An unusable output root is process-level; later accounts
                // would be writing into the same broken environment
                if matches!(err, SyncError::Filesystem { fatal: true, .. }) {
                    break;
                }
            }
        }
    }

    exit
}

/// Wires one configuration into a sync loop and runs it.
async fn run_account(config: Config, cancel: CancellationToken) -> Result<RunStats, SyncError> {
    if config.mode.delete_after_download {
        warn!(
            "--delete-after-download is deprecated; \
             use --keep-icloud-recent-days 0 instead"
        );
    }

    let store = Arc::new(FileSessionStore::new(&config.auth.cookie_directory));
    let service = Arc::new(
        ICloudClient::new(
            config.auth.username.clone(),
            config.auth.domain,
            store.clone(),
            DEFAULT_TIMEOUT,
        )?,
    );

    let handles = LoopHandles {
        service,
        session_store: store,
        credentials: credential_chain(&config),
        mfa: mfa_provider(&config),
        notifier: build_notifier(&config.reporting),
        sink: build_sink(&config),
        cancel,
    };

    SyncLoop::new(config, handles).run().await
}

/// Password providers in the configured order.
fn credential_chain(config: &Config) -> Vec<Arc<dyn ICredentialProvider>> {
    config
        .auth
        .password_providers
        .iter()
        .map(|kind| -> Arc<dyn ICredentialProvider> {
            match kind {
                PasswordProviderKind::Parameter => {
                    Arc::new(ParameterProvider::new(config.auth.password.clone()))
                }
                PasswordProviderKind::Keyring => Arc::new(KeyringProvider),
                PasswordProviderKind::Console => Arc::new(ConsoleProvider),
                PasswordProviderKind::Webui => Arc::new(WebUiProvider::new()),
            }
        })
        .collect()
}

fn mfa_provider(config: &Config) -> Arc<dyn IMfaProvider> {
    match config.auth.mfa_provider {
        MfaProviderKind::Console => Arc::new(ConsoleProvider),
        MfaProviderKind::Webui => Arc::new(WebUiProvider::new()),
    }
}
