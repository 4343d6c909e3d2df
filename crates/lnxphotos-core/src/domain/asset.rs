//! Asset domain entity
//!
//! An [`Asset`] is one photo or video entity in the remote library, valid for
//! the duration of the iteration pass that produced it. Each asset exposes a
//! set of downloadable [`Rendition`]s keyed by [`SizeTag`], plus a second set
//! of correlated video renditions when the asset is a live photo.
//!
//! Assets are immutable once built; the engine never mutates remote state
//! through them (deletion goes through the transport port by id).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{AlbumId, AssetId, LibraryId};

// ============================================================================
// SizeTag
// ============================================================================

/// Logical size of a downloadable rendition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SizeTag {
    /// Full-resolution original upload
    Original,
    /// Service-generated medium resolution
    Medium,
    /// Service-generated thumbnail
    Thumb,
    /// Edited version, present only when the asset has adjustments
    Adjusted,
    /// Secondary representation of a two-representation asset (RAW+JPEG)
    Alternative,
}

impl SizeTag {
    /// Returns the stable name used in configuration and file suffixes.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SizeTag::Original => "original",
            SizeTag::Medium => "medium",
            SizeTag::Thumb => "thumb",
            SizeTag::Adjusted => "adjusted",
            SizeTag::Alternative => "alternative",
        }
    }
}

impl std::fmt::Display for SizeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for SizeTag {
    type Err = super::errors::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(SizeTag::Original),
            "medium" => Ok(SizeTag::Medium),
            "thumb" => Ok(SizeTag::Thumb),
            "adjusted" => Ok(SizeTag::Adjusted),
            "alternative" => Ok(SizeTag::Alternative),
            other => Err(super::errors::DomainError::ValidationFailed(format!(
                "unknown size '{other}'"
            ))),
        }
    }
}

// ============================================================================
// AssetKind / MediaHint
// ============================================================================

/// Kind of asset as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Photo,
    Video,
    /// Still photo with a correlated short video
    Live,
}

impl AssetKind {
    /// Returns true for plain photos and the still half of live photos.
    #[must_use]
    pub fn is_photographic(&self) -> bool {
        matches!(self, AssetKind::Photo | AssetKind::Live)
    }
}

/// Coarse media type of a single rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaHint {
    Image,
    Movie,
}

impl MediaHint {
    /// Default file extension when the service reports no filename.
    #[must_use]
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaHint::Image => "JPG",
            MediaHint::Movie => "MOV",
        }
    }
}

// ============================================================================
// CapturedAt
// ============================================================================

/// Capture timestamp as reported by the service.
///
/// The service sometimes reports a zone-qualified instant and sometimes a
/// bare wall-clock value. The two cases are kept distinct; a floating value
/// only becomes an instant at the single point where one is needed, using
/// the configured fallback offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapturedAt {
    /// Wall-clock time with a known UTC offset
    Zoned(DateTime<FixedOffset>),
    /// Wall-clock time with no timezone information
    Floating(NaiveDateTime),
}

impl CapturedAt {
    /// Local wall-clock value, used by folder templates.
    #[must_use]
    pub fn wall_clock(&self) -> NaiveDateTime {
        match self {
            CapturedAt::Zoned(dt) => dt.naive_local(),
            CapturedAt::Floating(naive) => *naive,
        }
    }

    /// Resolves to a UTC instant, applying `fallback` to floating values.
    #[must_use]
    pub fn resolve_utc(&self, fallback: FixedOffset) -> DateTime<Utc> {
        match self {
            CapturedAt::Zoned(dt) => dt.with_timezone(&Utc),
            CapturedAt::Floating(naive) => match fallback.from_local_datetime(naive) {
                chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
                    dt.with_timezone(&Utc)
                }
                // Fixed offsets never produce gaps; unreachable in practice
                chrono::LocalResult::None => Utc.from_utc_datetime(naive),
            },
        }
    }

    /// Returns true when the timestamp carried timezone information.
    #[must_use]
    pub fn is_zoned(&self) -> bool {
        matches!(self, CapturedAt::Zoned(_))
    }
}

// ============================================================================
// Rendition
// ============================================================================

/// Lowercased extensions that identify a RAW representation.
const RAW_EXTENSIONS: &[&str] = &["arw", "cr2", "cr3", "crw", "dng", "nef", "orf", "raf", "rw2"];

/// One downloadable binary form of an asset at a given size tag.
///
/// The signed URL is only valid for the pass that fetched the asset; byte
/// length is authoritative and drives resume/verify decisions downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rendition {
    /// Logical size of this rendition
    pub size_tag: SizeTag,
    /// Service-supplied base file name; absent for some older assets
    pub filename: Option<String>,
    /// Exact length of the binary content in bytes
    pub byte_length: u64,
    /// Short-lived signed download URL
    pub signed_url: String,
    /// MIME type as reported by the service
    pub content_type: String,
    /// Coarse media type
    pub media_hint: MediaHint,
}

impl Rendition {
    /// Lowercased file extension from the service filename, if any.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.filename
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    /// Returns true if this rendition is a RAW image representation.
    #[must_use]
    pub fn is_raw(&self) -> bool {
        if let Some(ext) = self.extension() {
            if RAW_EXTENSIONS.contains(&ext.as_str()) {
                return true;
            }
        }
        // Vendor RAW MIME types follow the image/x-<vendor>-<format> shape
        let ct = self.content_type.to_ascii_lowercase();
        ct.starts_with("image/x-") && ct != "image/x-ms-bmp"
    }
}

// ============================================================================
// Asset
// ============================================================================

/// A single photo or video entity in the remote library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Stable opaque identifier
    id: AssetId,
    /// Photo, video, or live photo
    kind: AssetKind,
    /// Instant the asset entered the library (drives iteration order)
    added_at: DateTime<Utc>,
    /// Capture time; may be absent or lack timezone information
    captured_at: Option<CapturedAt>,
    /// Whether the user marked the asset as favorite
    is_favorite: bool,
    /// Albums this asset belongs to
    albums: BTreeSet<AlbumId>,
    /// Library the asset lives in
    library: LibraryId,
    /// True when the asset sits in the Recently-Deleted album
    deleted_in_icloud: bool,
    /// Still renditions by size
    renditions: BTreeMap<SizeTag, Rendition>,
    /// Correlated live-photo video renditions by size (empty unless `Live`)
    live_videos: BTreeMap<SizeTag, Rendition>,
    /// Raw adjustment payload when the asset has edits, for sidecar export
    adjustment_data: Option<String>,
}

impl Asset {
    /// Creates an asset with the required identity fields. Renditions and
    /// flags are attached with the `with_*` builders.
    #[must_use]
    pub fn new(id: AssetId, kind: AssetKind, added_at: DateTime<Utc>, library: LibraryId) -> Self {
        Self {
            id,
            kind,
            added_at,
            captured_at: None,
            is_favorite: false,
            albums: BTreeSet::new(),
            library,
            deleted_in_icloud: false,
            renditions: BTreeMap::new(),
            live_videos: BTreeMap::new(),
            adjustment_data: None,
        }
    }

    pub fn with_captured_at(mut self, captured_at: CapturedAt) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    pub fn with_favorite(mut self, favorite: bool) -> Self {
        self.is_favorite = favorite;
        self
    }

    pub fn with_albums(mut self, albums: impl IntoIterator<Item = AlbumId>) -> Self {
        self.albums = albums.into_iter().collect();
        self
    }

    pub fn with_deleted_in_icloud(mut self, deleted: bool) -> Self {
        self.deleted_in_icloud = deleted;
        self
    }

    pub fn with_rendition(mut self, rendition: Rendition) -> Self {
        self.renditions.insert(rendition.size_tag, rendition);
        self
    }

    pub fn with_live_video(mut self, rendition: Rendition) -> Self {
        self.live_videos.insert(rendition.size_tag, rendition);
        self
    }

    pub fn with_adjustment_data(mut self, data: impl Into<String>) -> Self {
        self.adjustment_data = Some(data.into());
        self
    }

    // --- Getters ---

    #[must_use]
    pub fn id(&self) -> &AssetId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    #[must_use]
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    #[must_use]
    pub fn captured_at(&self) -> Option<&CapturedAt> {
        self.captured_at.as_ref()
    }

    #[must_use]
    pub fn is_favorite(&self) -> bool {
        self.is_favorite
    }

    #[must_use]
    pub fn albums(&self) -> &BTreeSet<AlbumId> {
        &self.albums
    }

    #[must_use]
    pub fn library(&self) -> &LibraryId {
        &self.library
    }

    #[must_use]
    pub fn deleted_in_icloud(&self) -> bool {
        self.deleted_in_icloud
    }

    #[must_use]
    pub fn renditions(&self) -> &BTreeMap<SizeTag, Rendition> {
        &self.renditions
    }

    #[must_use]
    pub fn rendition(&self, size: SizeTag) -> Option<&Rendition> {
        self.renditions.get(&size)
    }

    #[must_use]
    pub fn live_video(&self, size: SizeTag) -> Option<&Rendition> {
        self.live_videos.get(&size)
    }

    #[must_use]
    pub fn adjustment_data(&self) -> Option<&str> {
        self.adjustment_data.as_deref()
    }

    /// Returns true for live photos (still plus correlated video).
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self.kind, AssetKind::Live)
    }

    /// Returns true when the asset carries an edited rendition.
    #[must_use]
    pub fn has_adjustment(&self) -> bool {
        self.renditions.contains_key(&SizeTag::Adjusted)
    }

    /// Returns true for two-representation assets (RAW+JPEG).
    #[must_use]
    pub fn has_alternative(&self) -> bool {
        self.renditions.contains_key(&SizeTag::Alternative)
    }

    /// Timestamp used for file mtime provenance: capture time resolved to
    /// UTC, falling back to the added-at instant.
    #[must_use]
    pub fn provenance_utc(&self, fallback: FixedOffset) -> DateTime<Utc> {
        self.captured_at
            .as_ref()
            .map(|c| c.resolve_utc(fallback))
            .unwrap_or(self.added_at)
    }
}
