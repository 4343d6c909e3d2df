//! Shared fixtures: an in-memory photo service plus asset/config builders.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use lnxphotos_core::config::Config;
use lnxphotos_core::domain::{
    AlbumId, Asset, AssetId, AssetKind, CapturedAt, LibraryId, MediaHint, Rendition, SizeTag,
    Username,
};
use lnxphotos_core::error::SyncError;
use lnxphotos_core::ports::{
    AlbumInfo, AssetPage, AuthOutcome, ByteStream, FetchScope, IPhotoService, LibraryInfo,
    PageCursor,
};

/// Chunk size the fake service streams in.
pub const CHUNK: usize = 100;

/// Scope key for the in-memory listing maps.
fn scope_key(scope: &FetchScope) -> String {
    match (&scope.album, scope.recently_deleted) {
        (Some(album), _) => format!("album:{album}"),
        (None, true) => "deleted".to_string(),
        (None, false) => "library".to_string(),
    }
}

/// In-memory photo service: fixed asset listings, byte bodies per signed
/// URL, and an optional stall point that cancels a token mid-stream to
/// simulate an interrupted run.
#[derive(Default)]
pub struct FakeService {
    listings: Mutex<HashMap<String, Vec<Asset>>>,
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    /// url -> (bytes to serve before stalling, token to cancel)
    stalls: Mutex<HashMap<String, (usize, CancellationToken)>>,
    pub deleted: Mutex<Vec<AssetId>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_library_asset(&self, asset: Asset) {
        self.listings
            .lock()
            .unwrap()
            .entry("library".to_string())
            .or_default()
            .push(asset);
    }

    pub fn add_recently_deleted(&self, asset: Asset) {
        self.listings
            .lock()
            .unwrap()
            .entry("deleted".to_string())
            .or_default()
            .push(asset);
    }

    pub fn set_body(&self, url: &str, body: Vec<u8>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body);
    }

    /// After serving `after_bytes` of this URL, cancel `token` and stall.
    pub fn stall_at(&self, url: &str, after_bytes: usize, token: CancellationToken) {
        self.stalls
            .lock()
            .unwrap()
            .insert(url.to_string(), (after_bytes, token));
    }

    pub fn clear_stalls(&self) {
        self.stalls.lock().unwrap().clear();
    }

    pub fn deleted_ids(&self) -> Vec<AssetId> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IPhotoService for FakeService {
    async fn restore_session(&self) -> Result<bool, SyncError> {
        Ok(true)
    }

    async fn sign_in(&self, _password: &str) -> Result<AuthOutcome, SyncError> {
        Ok(AuthOutcome::Authenticated)
    }

    async fn submit_mfa(&self, _code: &str) -> Result<(), SyncError> {
        Ok(())
    }

    async fn list_albums(&self, _library: &LibraryId) -> Result<Vec<AlbumInfo>, SyncError> {
        Ok(Vec::new())
    }

    async fn list_libraries(&self) -> Result<Vec<LibraryInfo>, SyncError> {
        Ok(vec![LibraryInfo {
            id: LibraryId::personal(),
            name: "Personal".to_string(),
        }])
    }

    async fn fetch_page(
        &self,
        scope: &FetchScope,
        _cursor: Option<&PageCursor>,
    ) -> Result<AssetPage, SyncError> {
        let mut assets = self
            .listings
            .lock()
            .unwrap()
            .get(&scope_key(scope))
            .cloned()
            .unwrap_or_default();
        assets.sort_by_key(|a| std::cmp::Reverse(a.added_at()));
        Ok(AssetPage {
            assets,
            cursor: None,
        })
    }

    async fn open_rendition(
        &self,
        rendition: &Rendition,
        offset: u64,
    ) -> Result<ByteStream, SyncError> {
        let body = self
            .bodies
            .lock()
            .unwrap()
            .get(&rendition.signed_url)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(rendition.signed_url.clone()))?;

        let offset = offset as usize;
        if offset > body.len() {
            return Err(SyncError::Unexpected("range beyond body".to_string()));
        }
        let remaining = body[offset..].to_vec();

        let stall = self
            .stalls
            .lock()
            .unwrap()
            .get(&rendition.signed_url)
            .cloned();

        let chunks: Vec<Result<Bytes, SyncError>> = match &stall {
            Some((after, _)) => {
                let upto = after.saturating_sub(offset).min(remaining.len());
                remaining[..upto]
                    .chunks(CHUNK)
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect()
            }
            None => remaining
                .chunks(CHUNK)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect(),
        };

        let head = futures::stream::iter(chunks);
        match stall {
            Some((_, token)) => {
                let tail = futures::stream::once(async move {
                    token.cancel();
                    futures::future::pending::<Result<Bytes, SyncError>>().await
                });
                Ok(head.chain(tail).boxed())
            }
            None => Ok(head.boxed()),
        }
    }

    async fn move_to_recently_deleted(&self, ids: &[AssetId]) -> Result<(), SyncError> {
        self.deleted.lock().unwrap().extend_from_slice(ids);
        Ok(())
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn username() -> Username {
    Username::new("tester@example.com".to_string()).unwrap()
}

pub fn config(directory: &std::path::Path) -> lnxphotos_core::config::ConfigBuilder {
    lnxphotos_core::config::ConfigBuilder::new(username(), directory.to_path_buf())
}

pub fn capture(rfc3339: &str) -> CapturedAt {
    CapturedAt::Zoned(DateTime::parse_from_rfc3339(rfc3339).unwrap())
}

/// A photo asset with one original rendition whose signed URL encodes the
/// asset id.
pub fn photo(
    id: &str,
    filename: &str,
    byte_length: u64,
    added_minutes_ago: i64,
    captured: &str,
) -> Asset {
    Asset::new(
        AssetId::new(id.to_string()).unwrap(),
        AssetKind::Photo,
        Utc::now() - Duration::minutes(added_minutes_ago),
        LibraryId::personal(),
    )
    .with_captured_at(capture(captured))
    .with_rendition(Rendition {
        size_tag: SizeTag::Original,
        filename: Some(filename.to_string()),
        byte_length,
        signed_url: format!("fake://{id}/original"),
        content_type: "image/jpeg".to_string(),
        media_hint: MediaHint::Image,
    })
}

/// A video asset with one original rendition.
pub fn video(
    id: &str,
    filename: &str,
    byte_length: u64,
    added_minutes_ago: i64,
    captured: &str,
) -> Asset {
    Asset::new(
        AssetId::new(id.to_string()).unwrap(),
        AssetKind::Video,
        Utc::now() - Duration::minutes(added_minutes_ago),
        LibraryId::personal(),
    )
    .with_captured_at(capture(captured))
    .with_rendition(Rendition {
        size_tag: SizeTag::Original,
        filename: Some(filename.to_string()),
        byte_length,
        signed_url: format!("fake://{id}/original"),
        content_type: "video/mp4".to_string(),
        media_hint: MediaHint::Movie,
    })
}

/// A live photo: HEIC still plus MOV video.
pub fn live_photo(
    id: &str,
    still_name: &str,
    still_len: u64,
    video_len: u64,
    added_minutes_ago: i64,
    captured: &str,
) -> Asset {
    Asset::new(
        AssetId::new(id.to_string()).unwrap(),
        AssetKind::Live,
        Utc::now() - Duration::minutes(added_minutes_ago),
        LibraryId::personal(),
    )
    .with_captured_at(capture(captured))
    .with_rendition(Rendition {
        size_tag: SizeTag::Original,
        filename: Some(still_name.to_string()),
        byte_length: still_len,
        signed_url: format!("fake://{id}/original"),
        content_type: "image/heic".to_string(),
        media_hint: MediaHint::Image,
    })
    .with_live_video(Rendition {
        size_tag: SizeTag::Original,
        filename: Some(still_name.replace(".HEIC", ".MOV")),
        byte_length: video_len,
        signed_url: format!("fake://{id}/live"),
        content_type: "video/quicktime".to_string(),
        media_hint: MediaHint::Movie,
    })
}

/// Registers an asset with the service including a body of the right size
/// for each rendition.
pub fn publish_asset(service: &FakeService, asset: &Asset) {
    for rendition in asset.renditions().values() {
        service.set_body(
            &rendition.signed_url,
            vec![b'x'; rendition.byte_length as usize],
        );
    }
    for size in [SizeTag::Original, SizeTag::Medium, SizeTag::Thumb] {
        if let Some(video) = asset.live_video(size) {
            service.set_body(&video.signed_url, vec![b'v'; video.byte_length as usize]);
        }
    }
    service.add_library_asset(asset.clone());
}

/// Convenience: engine + iterator + pass over the given config.
pub async fn run_pass(
    service: Arc<FakeService>,
    config: &Config,
    cancel: CancellationToken,
) -> lnxphotos_sync::PassOutcome {
    use lnxphotos_core::ports::NullEventSink;
    use lnxphotos_sync::{AssetIterator, ReconcileEngine};

    let engine = ReconcileEngine::new(
        service.clone(),
        config.clone(),
        LibraryId::personal(),
        Arc::new(NullEventSink),
        cancel,
    )
    .unwrap();

    let mut iterator = AssetIterator::new(
        service,
        vec![FetchScope::library(LibraryId::personal())],
        config.filters.clone(),
        lnxphotos_sync::engine::fallback_offset(config),
    );

    engine.run_pass(&mut iterator).await.unwrap()
}

/// Unused-field silencer for AlbumId in scope keys.
#[allow(dead_code)]
pub fn album_id(raw: &str) -> AlbumId {
    AlbumId::new(raw.to_string()).unwrap()
}
