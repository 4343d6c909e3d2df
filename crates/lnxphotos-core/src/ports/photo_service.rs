//! Photo service port (driven/secondary port)
//!
//! Interface to the remote photo service. The production implementation
//! speaks the iCloud web API, but the trait deliberately exposes only the
//! operations the engine needs: session management, cursored asset listing
//! in added-date descending order, rendition byte streams, and moving
//! assets to the Recently-Deleted album.
//!
//! ## Design Notes
//!
//! - Errors are [`SyncError`] values so the sync loop can classify them
//!   without string matching; adapters convert HTTP statuses at the edge.
//! - Listing is cursor-based and ordered by added-date descending; that
//!   ordering is part of the contract, the iterator builds its
//!   early-termination logic on it.
//! - One connection per account: implementations must not fan out
//!   concurrent requests for a single context.

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::domain::{AlbumId, Asset, AssetId, LibraryId, Rendition};
use crate::error::SyncError;

// ============================================================================
// Listing DTOs
// ============================================================================

/// A remote album, as returned by [`IPhotoService::list_albums`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumInfo {
    pub id: AlbumId,
    pub name: String,
    /// Asset count when the service reports one
    pub asset_count: Option<u64>,
}

/// A photo library available to the account (personal or shared).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryInfo {
    pub id: LibraryId,
    pub name: String,
}

/// Opaque pagination cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor(pub String);

/// What to list: one library, optionally narrowed to one album or to the
/// Recently-Deleted album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchScope {
    pub library: LibraryId,
    pub album: Option<AlbumId>,
    /// List the Recently-Deleted album instead of the main collection.
    pub recently_deleted: bool,
}

impl FetchScope {
    /// Whole-library scope.
    #[must_use]
    pub fn library(library: LibraryId) -> Self {
        Self {
            library,
            album: None,
            recently_deleted: false,
        }
    }

    /// Single-album scope.
    #[must_use]
    pub fn album(library: LibraryId, album: AlbumId) -> Self {
        Self {
            library,
            album: Some(album),
            recently_deleted: false,
        }
    }

    /// Recently-Deleted scope for the given library.
    #[must_use]
    pub fn recently_deleted(library: LibraryId) -> Self {
        Self {
            library,
            album: None,
            recently_deleted: true,
        }
    }
}

/// One page of assets in added-date descending order.
#[derive(Debug, Clone)]
pub struct AssetPage {
    pub assets: Vec<Asset>,
    /// Cursor for the next page; `None` on the last page.
    pub cursor: Option<PageCursor>,
}

/// Outcome of a password sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Fully signed in; service calls may proceed.
    Authenticated,
    /// Password accepted, a two-factor code must be submitted.
    MfaRequired,
}

/// Streamed rendition content.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, SyncError>> + Send>>;

// ============================================================================
// IPhotoService trait
// ============================================================================

/// Port trait for remote photo service operations.
///
/// Implementations own the HTTP session, cookie handling, and endpoint
/// details; the engine only sees domain values and [`SyncError`]s.
#[async_trait::async_trait]
pub trait IPhotoService: Send + Sync {
    /// Attempts to restore a previously persisted session.
    ///
    /// # Returns
    /// `true` when a stored session is present and still valid, `false`
    /// when a fresh sign-in is required.
    async fn restore_session(&self) -> Result<bool, SyncError>;

    /// Signs in with the account password.
    ///
    /// # Returns
    /// [`AuthOutcome::MfaRequired`] when the account needs a two-factor
    /// code before service calls are allowed.
    async fn sign_in(&self, password: &str) -> Result<AuthOutcome, SyncError>;

    /// Submits a two-factor code and requests session trust so subsequent
    /// sign-ins inside the trust window skip MFA.
    async fn submit_mfa(&self, code: &str) -> Result<(), SyncError>;

    /// Lists the account's albums in the given library.
    async fn list_albums(&self, library: &LibraryId) -> Result<Vec<AlbumInfo>, SyncError>;

    /// Lists the libraries available to the account.
    async fn list_libraries(&self) -> Result<Vec<LibraryInfo>, SyncError>;

    /// Fetches one page of assets for a scope, newest added-date first.
    ///
    /// # Arguments
    /// * `scope` - Library/album selection
    /// * `cursor` - Continuation cursor from the previous page, if any
    async fn fetch_page(
        &self,
        scope: &FetchScope,
        cursor: Option<&PageCursor>,
    ) -> Result<AssetPage, SyncError>;

    /// Opens a byte stream for a rendition, starting at `offset` (HTTP
    /// range continuation for resumed downloads; `0` streams from the
    /// beginning).
    async fn open_rendition(
        &self,
        rendition: &Rendition,
        offset: u64,
    ) -> Result<ByteStream, SyncError>;

    /// Moves the given assets to the Recently-Deleted album.
    ///
    /// Implementations batch where the service supports it; the call is
    /// all-or-nothing per invocation.
    async fn move_to_recently_deleted(&self, ids: &[AssetId]) -> Result<(), SyncError>;
}
