//! iCloud photo service client
//!
//! Production implementation of [`IPhotoService`]: owns the HTTP client,
//! the in-memory session, and the persisted session file, and maps every
//! HTTP status into the engine's error taxonomy at this boundary.
//!
//! The client is strictly single-connection: every service call goes
//! through the request pacer, and nothing here fans out concurrently.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use lnxphotos_core::config::ServiceDomain;
use lnxphotos_core::domain::{AlbumId, AssetId, LibraryId, Rendition, Username};
use lnxphotos_core::error::SyncError;
use lnxphotos_core::ports::{
    AlbumInfo, AssetPage, AuthOutcome, ByteStream, FetchScope, IPhotoService, ISessionStore,
    LibraryInfo, PageCursor, SessionData,
};

use crate::auth::{
    self, capture_cookies, classify_status, cookie_header, map_transport_error, Endpoints,
};
use crate::dto::{AlbumsResponse, LibrariesResponse, QueryResponse};
use crate::pacing::RequestPacer;

/// Assets per query page.
const PAGE_SIZE: u32 = 100;

/// Default per-request transport timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the iCloud photo service.
pub struct ICloudClient {
    http: Client,
    endpoints: Endpoints,
    username: Username,
    store: Arc<dyn ISessionStore>,
    session: Mutex<SessionData>,
    photos_base: Mutex<Option<String>>,
    pacer: RequestPacer,
}

impl ICloudClient {
    /// Creates a client for one account.
    ///
    /// `timeout` bounds connection establishment and socket reads; it does
    /// not cap total download duration (large videos stream for longer).
    pub fn new(
        username: Username,
        domain: ServiceDomain,
        store: Arc<dyn ISessionStore>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let http = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent("lnxphotos/0.1")
            .build()
            .map_err(|e| SyncError::Unexpected(format!("HTTP client construction: {e}")))?;

        Ok(Self {
            http,
            endpoints: Endpoints::for_domain(domain),
            username,
            store,
            session: Mutex::new(SessionData::default()),
            photos_base: Mutex::new(None),
            pacer: RequestPacer::default(),
        })
    }

    /// Overrides the service endpoints (tests against a mock server).
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Overrides the request pacer (tests disable the spacing).
    #[must_use]
    pub fn with_pacer(mut self, pacer: RequestPacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// The photo database base URL; present only after authentication.
    async fn photos_url(&self) -> Result<String, SyncError> {
        self.photos_base
            .lock()
            .await
            .clone()
            .ok_or(SyncError::AuthExpired)
    }

    /// Exchanges the session token for service cookies and refreshes the
    /// photo database endpoint.
    async fn refresh_service_url(&self) -> Result<(), SyncError> {
        let mut session = self.session.lock().await;
        let url = auth::account_login(&self.http, &self.endpoints, &mut session).await?;
        drop(session);
        debug!(%url, "Photo service endpoint resolved");
        *self.photos_base.lock().await = Some(url);
        Ok(())
    }

    async fn persist_session(&self) -> Result<(), SyncError> {
        let session = self.session.lock().await;
        self.store.save(&self.username, &session)
    }

    /// Paced POST with cookies attached and captured.
    async fn post_json(
        &self,
        url: String,
        body: serde_json::Value,
        context: &str,
    ) -> Result<reqwest::Response, SyncError> {
        self.pacer.acquire().await;

        let cookie = {
            let session = self.session.lock().await;
            cookie_header(&session)
        };

        let response = self
            .http
            .post(url)
            .header(reqwest::header::COOKIE, cookie)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        {
            let mut session = self.session.lock().await;
            capture_cookies(&response, &mut session);
        }

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(classify_status(response.status(), context))
        }
    }
}

#[async_trait::async_trait]
impl IPhotoService for ICloudClient {
    async fn restore_session(&self) -> Result<bool, SyncError> {
        let Some(stored) = self.store.load(&self.username)? else {
            return Ok(false);
        };

        {
            *self.session.lock().await = stored;
        }

        match self.refresh_service_url().await {
            Ok(()) => {
                self.persist_session().await?;
                info!(username = %self.username, "Session restored from store");
                Ok(true)
            }
            Err(SyncError::AuthExpired | SyncError::AuthFailed { .. }) => {
                debug!(username = %self.username, "Stored session no longer valid");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    async fn sign_in(&self, password: &str) -> Result<AuthOutcome, SyncError> {
        let outcome = {
            let mut session = self.session.lock().await;
            auth::sign_in(
                &self.http,
                &self.endpoints,
                &mut session,
                &self.username,
                password,
            )
            .await?
        };

        if outcome == AuthOutcome::Authenticated {
            self.refresh_service_url().await?;
        }
        // Persist either way: the MFA step needs the flow state back
        self.persist_session().await?;
        Ok(outcome)
    }

    async fn submit_mfa(&self, code: &str) -> Result<(), SyncError> {
        {
            let mut session = self.session.lock().await;
            auth::submit_mfa(&self.http, &self.endpoints, &mut session, code).await?;
        }

        self.refresh_service_url().await?;
        self.persist_session().await?;
        Ok(())
    }

    async fn list_albums(&self, library: &LibraryId) -> Result<Vec<AlbumInfo>, SyncError> {
        let base = self.photos_url().await?;
        let response = self
            .post_json(
                format!("{base}/albums/list"),
                json!({ "zoneId": library.as_str() }),
                "album listing",
            )
            .await?;

        let parsed: AlbumsResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Unexpected(format!("album listing body: {e}")))?;

        let mut albums = Vec::with_capacity(parsed.albums.len());
        for record in parsed.albums {
            let id = AlbumId::new(record.album_id)
                .map_err(|e| SyncError::Unexpected(format!("bad album id: {e}")))?;
            albums.push(AlbumInfo {
                id,
                name: record.name,
                asset_count: record.asset_count,
            });
        }
        Ok(albums)
    }

    async fn list_libraries(&self) -> Result<Vec<LibraryInfo>, SyncError> {
        let base = self.photos_url().await?;
        let response = self
            .post_json(format!("{base}/zones/list"), json!({}), "library listing")
            .await?;

        let parsed: LibrariesResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Unexpected(format!("library listing body: {e}")))?;

        let mut libraries = Vec::with_capacity(parsed.zones.len());
        for zone in parsed.zones {
            let name = zone.name.clone().unwrap_or_else(|| zone.zone_id.clone());
            let id = LibraryId::new(zone.zone_id)
                .map_err(|e| SyncError::Unexpected(format!("bad zone id: {e}")))?;
            libraries.push(LibraryInfo { id, name });
        }
        Ok(libraries)
    }

    async fn fetch_page(
        &self,
        scope: &FetchScope,
        cursor: Option<&PageCursor>,
    ) -> Result<AssetPage, SyncError> {
        let base = self.photos_url().await?;
        let body = json!({
            "zoneId": scope.library.as_str(),
            "albumId": scope.album.as_ref().map(AlbumId::as_str),
            "recentlyDeleted": scope.recently_deleted,
            "pageSize": PAGE_SIZE,
            "continuationMarker": cursor.map(|c| c.0.clone()),
            "sortBy": "addedDate",
            "direction": "descending",
        });

        let response = self
            .post_json(format!("{base}/records/query"), body, "record query")
            .await?;

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Unexpected(format!("record query body: {e}")))?;

        let mut assets = Vec::with_capacity(parsed.records.len());
        for record in parsed.records {
            assets.push(record.into_asset(&scope.library)?);
        }

        Ok(AssetPage {
            assets,
            cursor: parsed.continuation_marker.map(PageCursor),
        })
    }

    async fn open_rendition(
        &self,
        rendition: &Rendition,
        offset: u64,
    ) -> Result<ByteStream, SyncError> {
        self.pacer.acquire().await;

        let mut request = self.http.get(&rendition.signed_url);
        if offset > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().await.map_err(map_transport_error)?;

        match response.status() {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => {}
            status => return Err(classify_status(status, "rendition download")),
        }
        // A 200 to a ranged request means the server ignored the range; the
        // resulting over-long partial fails length verification downstream
        // and restarts from zero, so no special case is needed here.

        let stream = response.bytes_stream().map_err(map_transport_error);
        Ok(Box::pin(stream))
    }

    async fn move_to_recently_deleted(&self, ids: &[AssetId]) -> Result<(), SyncError> {
        let base = self.photos_url().await?;
        let record_names: Vec<&str> = ids.iter().map(AssetId::as_str).collect();

        self.post_json(
            format!("{base}/records/delete"),
            json!({ "recordNames": record_names }),
            "record deletion",
        )
        .await?;

        debug!(count = ids.len(), "Moved assets to Recently-Deleted");
        Ok(())
    }
}
