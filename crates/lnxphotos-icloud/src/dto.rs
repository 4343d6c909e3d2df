//! Wire DTOs for the photo service
//!
//! Raw response shapes for the record-query endpoints, plus the mapping
//! into domain [`Asset`]s. DTOs stay in this crate; nothing above the
//! transport ever sees them.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::Deserialize;

use lnxphotos_core::domain::{
    AlbumId, Asset, AssetId, AssetKind, CapturedAt, LibraryId, MediaHint, Rendition, SizeTag,
};
use lnxphotos_core::error::SyncError;

/// Response of a record query: one page of assets plus a continuation
/// marker when more pages follow.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub records: Vec<AssetRecord>,
    pub continuation_marker: Option<String>,
}

/// One asset record from the service.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    /// Stable record identifier (the asset id)
    pub record_name: String,
    /// "photo", "video", or "live"
    pub item_type: String,
    /// Epoch milliseconds the asset entered the library
    pub added_date: i64,
    /// Epoch milliseconds of capture, when known
    pub asset_date: Option<i64>,
    /// Capture timezone offset in seconds east of UTC; absent when the
    /// service reports a floating wall-clock
    pub time_zone_offset: Option<i32>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub album_ids: Vec<String>,
    pub adjustment_data: Option<String>,
    #[serde(default)]
    pub renditions: Vec<RenditionRecord>,
    #[serde(default)]
    pub live_video_renditions: Vec<RenditionRecord>,
}

/// One downloadable form of an asset.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenditionRecord {
    /// "original", "medium", "thumb", "adjusted", "alternative"
    pub size: String,
    pub filename: Option<String>,
    pub size_bytes: u64,
    /// Signed, short-lived download URL
    pub url: String,
    pub content_type: String,
}

/// Album listing response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumsResponse {
    #[serde(default)]
    pub albums: Vec<AlbumRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumRecord {
    pub album_id: String,
    pub name: String,
    pub asset_count: Option<u64>,
}

/// Library (zone) listing response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibrariesResponse {
    #[serde(default)]
    pub zones: Vec<ZoneRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneRecord {
    pub zone_id: String,
    pub name: Option<String>,
}

impl AssetRecord {
    /// Maps the wire record into a domain asset.
    pub fn into_asset(self, library: &LibraryId) -> Result<Asset, SyncError> {
        let id = AssetId::new(self.record_name)
            .map_err(|e| SyncError::Unexpected(format!("bad record id: {e}")))?;

        let kind = match self.item_type.as_str() {
            "photo" => AssetKind::Photo,
            "video" => AssetKind::Video,
            "live" => AssetKind::Live,
            other => {
                return Err(SyncError::Unexpected(format!(
                    "unknown item type '{other}'"
                )))
            }
        };

        let added_at = epoch_ms_to_utc(self.added_date)?;

        let mut albums = Vec::new();
        for raw in self.album_ids {
            let album = AlbumId::new(raw)
                .map_err(|e| SyncError::Unexpected(format!("bad album id: {e}")))?;
            albums.push(album);
        }

        let mut asset = Asset::new(id, kind, added_at, library.clone())
            .with_favorite(self.is_favorite)
            .with_deleted_in_icloud(self.is_deleted)
            .with_albums(albums);

        if let Some(asset_date) = self.asset_date {
            asset = asset.with_captured_at(captured_at(asset_date, self.time_zone_offset)?);
        }
        if let Some(adjustment) = self.adjustment_data {
            asset = asset.with_adjustment_data(adjustment);
        }

        for record in self.renditions {
            asset = asset.with_rendition(record.into_rendition(MediaHint::Image)?);
        }
        for record in self.live_video_renditions {
            asset = asset.with_live_video(record.into_rendition(MediaHint::Movie)?);
        }

        Ok(asset)
    }
}

impl RenditionRecord {
    fn into_rendition(self, default_hint: MediaHint) -> Result<Rendition, SyncError> {
        let size_tag: SizeTag = self
            .size
            .parse()
            .map_err(|_| SyncError::Unexpected(format!("unknown rendition size '{}'", self.size)))?;

        let media_hint = if self.content_type.starts_with("video/") {
            MediaHint::Movie
        } else if self.content_type.starts_with("image/") {
            MediaHint::Image
        } else {
            default_hint
        };

        Ok(Rendition {
            size_tag,
            filename: self.filename,
            byte_length: self.size_bytes,
            signed_url: self.url,
            content_type: self.content_type,
            media_hint,
        })
    }
}

fn epoch_ms_to_utc(ms: i64) -> Result<DateTime<Utc>, SyncError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| SyncError::Unexpected(format!("timestamp out of range: {ms}")))
}

/// Capture time: zone-qualified when the service reports an offset,
/// floating wall-clock otherwise.
fn captured_at(asset_date_ms: i64, tz_offset_secs: Option<i32>) -> Result<CapturedAt, SyncError> {
    let utc = epoch_ms_to_utc(asset_date_ms)?;
    match tz_offset_secs {
        Some(secs) => {
            let offset = FixedOffset::east_opt(secs)
                .ok_or_else(|| SyncError::Unexpected(format!("bad tz offset: {secs}")))?;
            Ok(CapturedAt::Zoned(utc.with_timezone(&offset)))
        }
        None => Ok(CapturedAt::Floating(utc.naive_utc())),
    }
}
