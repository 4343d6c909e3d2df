//! Sync loop
//!
//! Drives authentication, passes, deletion realization, and the optional
//! watch-interval sleep for one account context. The state machine:
//!
//! ```text
//! INIT ── authenticate ──► PASS ── ok ─────────────► DONE (if not watch)
//!                          │                       └► WAIT ── tick ──► PASS
//!                          ├── auth_expired ──────► INIT
//!                          ├── service_unavailable ► WAIT_BACKOFF ──► INIT
//!                          ├── rate_limited ──────► WAIT_BACKOFF ──► PASS
//!                          └── fatal ─────────────► EXIT(non-zero)
//! ```
//!
//! Every suspension point (backoff sleeps, the watch tick, credential
//! prompts, transport calls) observes the cancellation token; cancellation
//! finishes the current asset, keeps partials, flushes the session store,
//! and returns cleanly.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lnxphotos_core::config::{Config, LibraryScope};
use lnxphotos_core::domain::{LibraryId, Username};
use lnxphotos_core::error::{ErrorClass, SyncError};
use lnxphotos_core::ports::{
    AuthOutcome, FetchScope, ICredentialProvider, IEventSink, IMfaProvider, INotifier,
    IPhotoService, ISessionStore,
};

use crate::deleter::DeletionPlanner;
use crate::engine::{fallback_offset, ReconcileEngine};
use crate::iterator::AssetIterator;
use crate::local_index::LocalIndex;

/// Watch intervals below this are clamped (service rate thresholds).
const MIN_WATCH_INTERVAL_SECS: u64 = 30;

/// Consecutive transient pass failures before giving up (single-shot mode).
const MAX_TRANSIENT_FAILURES: u32 = 5;

/// Re-authentication attempts per INIT.
const MAX_REAUTH_ATTEMPTS: u32 = 2;

/// Base backoff after a transient pass failure.
const TRANSIENT_BACKOFF: Duration = Duration::from_secs(5);

/// Backoff after rate limiting when the service suggests no delay.
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

/// Backoff cap.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Aggregated result of a full run (one or many passes).
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub passes: u64,
    pub downloaded: u64,
    pub bytes_downloaded: u64,
    pub already_present: u64,
    pub deleted_local: u64,
    pub deleted_remote: u64,
    pub cancelled: bool,
}

/// External collaborators of the loop, all behind ports.
pub struct LoopHandles {
    pub service: Arc<dyn IPhotoService>,
    pub session_store: Arc<dyn ISessionStore>,
    pub credentials: Vec<Arc<dyn ICredentialProvider>>,
    pub mfa: Arc<dyn IMfaProvider>,
    pub notifier: Arc<dyn INotifier>,
    pub sink: Arc<dyn IEventSink>,
    pub cancel: CancellationToken,
}

/// The per-account sync loop.
pub struct SyncLoop {
    config: Config,
    handles: LoopHandles,
}

impl SyncLoop {
    pub fn new(config: Config, handles: LoopHandles) -> Self {
        Self { config, handles }
    }

    /// Runs until done: a single pass, or repeated passes in watch mode.
    pub async fn run(&self) -> Result<RunStats, SyncError> {
        let username = self.config.auth.username.clone();

        // One writer per (cookie_dir, username); held for the whole run
        let _session_lock = self.handles.session_store.lock(&username)?;

        let mut stats = RunStats::default();
        self.authenticate(&username).await?;

        if self.config.auth.auth_only {
            info!(%username, "Authentication complete (auth-only mode)");
            return Ok(stats);
        }

        let mut transient_failures: u32 = 0;

        loop {
            if self.handles.cancel.is_cancelled() {
                stats.cancelled = true;
                return Ok(stats);
            }

            match self.run_one_pass(&username).await {
                Ok(pass) => {
                    transient_failures = 0;
                    stats.passes += 1;
                    stats.downloaded += pass.summary.downloaded;
                    stats.bytes_downloaded += pass.summary.bytes_downloaded;
                    stats.already_present += pass.summary.already_present;
                    stats.deleted_local += pass.summary.deleted_local;
                    stats.deleted_remote += pass.summary.deleted_remote;

                    if pass.cancelled {
                        stats.cancelled = true;
                        return Ok(stats);
                    }

                    let Some(configured) = self.config.watch.interval_seconds else {
                        return Ok(stats);
                    };
                    if configured < MIN_WATCH_INTERVAL_SECS {
                        warn!(
                            configured,
                            floor = MIN_WATCH_INTERVAL_SECS,
                            "Watch interval below safety floor, clamping"
                        );
                    }
                    let interval = configured.max(MIN_WATCH_INTERVAL_SECS);
                    debug!(interval, "Pass complete, waiting for next tick");
                    if self.sleep_cancellable(Duration::from_secs(interval)).await {
                        stats.cancelled = true;
                        return Ok(stats);
                    }
                }
                Err(err) => match err.class() {
                    ErrorClass::Cancelled => {
                        stats.cancelled = true;
                        return Ok(stats);
                    }
                    ErrorClass::Reauth => {
                        warn!(%username, "Session expired, re-authenticating");
                        self.notify_reauth(&username).await;
                        self.authenticate(&username).await?;
                    }
                    ErrorClass::Retryable => {
                        transient_failures += 1;
                        if !self.backoff_or_give_up(transient_failures, &err).await? {
                            stats.cancelled = true;
                            return Ok(stats);
                        }
                        // Session may have rotted during the outage
                        self.authenticate(&username).await?;
                    }
                    ErrorClass::RateLimited => {
                        transient_failures += 1;
                        let delay = match &err {
                            SyncError::RateLimited {
                                retry_after: Some(delay),
                            } => (*delay).min(MAX_BACKOFF),
                            _ => RATE_LIMIT_BACKOFF,
                        };
                        warn!(delay_secs = delay.as_secs(), "Rate limited, backing off");
                        if transient_failures > MAX_TRANSIENT_FAILURES
                            && self.config.watch.interval_seconds.is_none()
                        {
                            return Err(err);
                        }
                        if self.sleep_cancellable(delay).await {
                            stats.cancelled = true;
                            return Ok(stats);
                        }
                    }
                    ErrorClass::Skip | ErrorClass::Fatal => return Err(err),
                },
            }
        }
    }

    /// INIT state: restore the persisted session or sign in afresh, with a
    /// bounded number of attempts.
    async fn authenticate(&self, username: &Username) -> Result<(), SyncError> {
        let mut last_err: Option<SyncError> = None;

        for attempt in 0..MAX_REAUTH_ATTEMPTS {
            if self.handles.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            match self.handles.service.restore_session().await {
                Ok(true) => {
                    debug!(%username, "Restored persisted session");
                    return Ok(());
                }
                Ok(false) => {}
                Err(err) if err.is_retryable() && attempt + 1 < MAX_REAUTH_ATTEMPTS => {
                    warn!(error = %err, "Session restore failed, retrying");
                    last_err = Some(err);
                    if self.sleep_cancellable(TRANSIENT_BACKOFF).await {
                        return Err(SyncError::Cancelled);
                    }
                    continue;
                }
                Err(err) => return Err(err),
            }

            let password = self.obtain_password(username).await?;
            match self.handles.service.sign_in(&password).await {
                Ok(AuthOutcome::Authenticated) => {
                    self.remember_password(username, &password).await;
                    info!(%username, "Signed in");
                    return Ok(());
                }
                Ok(AuthOutcome::MfaRequired) => {
                    self.notify_reauth(username).await;
                    let code = self.handles.mfa.code(username).await?;
                    self.handles.service.submit_mfa(&code).await?;
                    self.remember_password(username, &password).await;
                    info!(%username, "Signed in with two-factor code");
                    return Ok(());
                }
                Err(err) if err.is_retryable() && attempt + 1 < MAX_REAUTH_ATTEMPTS => {
                    warn!(error = %err, "Sign-in failed transiently, retrying");
                    last_err = Some(err);
                    if self.sleep_cancellable(TRANSIENT_BACKOFF).await {
                        return Err(SyncError::Cancelled);
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or(SyncError::AuthFailed {
            reason: "re-authentication attempts exhausted".to_string(),
        }))
    }

    /// PASS state: reconcile, then realize deletions (with one re-auth
    /// retry for a mid-batch session expiry).
    async fn run_one_pass(
        &self,
        username: &Username,
    ) -> Result<crate::engine::PassOutcome, SyncError> {
        let library = self.resolve_library().await?;
        let scopes = self.resolve_scopes(&library).await?;

        let engine = ReconcileEngine::new(
            self.handles.service.clone(),
            self.config.clone(),
            library,
            self.handles.sink.clone(),
            self.handles.cancel.clone(),
        )?;
        let mut iterator = AssetIterator::new(
            self.handles.service.clone(),
            scopes,
            self.config.filters.clone(),
            fallback_offset(&self.config),
        );

        let mut outcome = engine.run_pass(&mut iterator).await?;

        if outcome.cancelled {
            // Unattempted intents are discarded on cancellation
            return Ok(outcome);
        }

        let planner = DeletionPlanner::new(
            self.handles.service.clone(),
            LocalIndex::new(&self.config.output.directory),
            self.handles.sink.clone(),
            self.config.side_effects.dry_run || self.config.side_effects.only_print_filenames,
            self.handles.cancel.clone(),
        );

        let stats = match planner.realize(&mut outcome.plan).await {
            Ok(stats) => stats,
            Err(err) if err.requires_reauth() => {
                warn!("Session expired during deletion phase, retrying batch once");
                self.authenticate(username).await?;
                planner.realize(&mut outcome.plan).await?
            }
            Err(err) => return Err(err),
        };

        outcome.summary.deleted_local += stats.local_deleted;
        outcome.summary.deleted_remote += stats.remote_deleted;

        Ok(outcome)
    }

    /// Maps the configured library scope to a concrete library id.
    async fn resolve_library(&self) -> Result<LibraryId, SyncError> {
        match self.config.filters.library {
            LibraryScope::Personal => Ok(LibraryId::personal()),
            LibraryScope::Shared => {
                let libraries = self.handles.service.list_libraries().await?;
                libraries
                    .into_iter()
                    .map(|l| l.id)
                    .find(|id| !id.is_personal())
                    .ok_or_else(|| {
                        SyncError::Config("account has no shared library".to_string())
                    })
            }
        }
    }

    /// Resolves album-name filters to fetch scopes, or the whole library.
    async fn resolve_scopes(&self, library: &LibraryId) -> Result<Vec<FetchScope>, SyncError> {
        if self.config.filters.albums.is_empty() {
            return Ok(vec![FetchScope::library(library.clone())]);
        }

        let available = self.handles.service.list_albums(library).await?;
        let mut scopes = Vec::with_capacity(self.config.filters.albums.len());
        for wanted in &self.config.filters.albums {
            let album = available
                .iter()
                .find(|a| &a.name == wanted)
                .ok_or_else(|| SyncError::Config(format!("album not found: {wanted}")))?;
            scopes.push(FetchScope::album(library.clone(), album.id.clone()));
        }
        Ok(scopes)
    }

    /// Walks the provider chain for a password.
    async fn obtain_password(&self, username: &Username) -> Result<String, SyncError> {
        for provider in &self.handles.credentials {
            match provider.password(username).await {
                Ok(Some(password)) => {
                    debug!(provider = provider.name(), "Password obtained");
                    return Ok(password);
                }
                Ok(None) => continue,
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "Password provider failed");
                }
            }
        }
        Err(SyncError::AuthFailed {
            reason: "no password provider produced a password".to_string(),
        })
    }

    /// Offers a just-validated password to every provider for storage.
    async fn remember_password(&self, username: &Username, password: &str) {
        for provider in &self.handles.credentials {
            if let Err(err) = provider.remember(username, password).await {
                debug!(provider = provider.name(), error = %err, "Provider did not store password");
            }
        }
    }

    /// Best-effort re-auth notification; failures are logged, never fatal.
    async fn notify_reauth(&self, username: &Username) {
        if let Err(err) = self.handles.notifier.reauth_required(username).await {
            warn!(error = %err, "Failed to send re-authentication notification");
        }
    }

    /// Backoff after a transient failure. Returns `Ok(false)` on
    /// cancellation, `Err` when the failure budget is exhausted outside
    /// watch mode.
    async fn backoff_or_give_up(&self, failures: u32, err: &SyncError) -> Result<bool, SyncError> {
        if failures > MAX_TRANSIENT_FAILURES {
            if self.config.watch.interval_seconds.is_some() {
                // Watch mode never terminates on transient errors; wait a
                // full interval and start over
                let interval = self
                    .config
                    .watch
                    .interval_seconds
                    .unwrap_or(MIN_WATCH_INTERVAL_SECS)
                    .max(MIN_WATCH_INTERVAL_SECS);
                warn!(
                    failures,
                    interval, "Transient failures persist, waiting a full watch interval"
                );
                return Ok(!self.sleep_cancellable(Duration::from_secs(interval)).await);
            }
            return Err(SyncError::ServiceUnavailable(format!(
                "giving up after {failures} transient failures: {err}"
            )));
        }

        let exp = TRANSIENT_BACKOFF.saturating_mul(2u32.saturating_pow(failures.saturating_sub(1)));
        let capped = exp.min(MAX_BACKOFF);
        let jitter = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 4);
        let delay = capped + Duration::from_millis(jitter);
        warn!(
            failures,
            delay_secs = delay.as_secs(),
            error = %err,
            "Transient pass failure, backing off"
        );
        Ok(!self.sleep_cancellable(delay).await)
    }

    /// Sleeps unless cancelled first. Returns `true` when cancelled.
    async fn sleep_cancellable(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.handles.cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}
