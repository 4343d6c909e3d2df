//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IPhotoService`] - Remote photo service (listing, streams, deletion)
//! - [`ICredentialProvider`] / [`IMfaProvider`] - Password and MFA acquisition
//! - [`ISessionStore`] - Cookie/token persistence between runs
//! - [`INotifier`] - Re-authentication notifications
//! - [`IEventSink`] - Engine event consumers (progress, plugins)

pub mod credentials;
pub mod events;
pub mod notification;
pub mod photo_service;
pub mod session_store;

pub use credentials::{ICredentialProvider, IMfaProvider};
pub use events::{AssetEvent, IEventSink, NullEventSink, PassSummary};
pub use notification::{INotifier, NullNotifier};
pub use photo_service::{
    AlbumInfo, AssetPage, AuthOutcome, ByteStream, FetchScope, IPhotoService, LibraryInfo,
    PageCursor,
};
pub use session_store::{ISessionLock, ISessionStore, SessionData, StoredCookie};
