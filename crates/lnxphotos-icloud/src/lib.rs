//! LNXPhotos iCloud adapter
//!
//! Transport implementation of the core's `IPhotoService` and
//! `ISessionStore` ports against the iCloud web API:
//!
//! - [`client`] - the HTTP client and port implementation
//! - [`auth`] - sign-in, MFA, session trust, and the setup-service login
//! - [`session`] - file-backed cookie/token persistence with locking
//! - [`dto`] - wire response shapes and domain mapping
//! - [`pacing`] - single-connection request spacing
//!
//! Endpoint URLs, header names, and cookie semantics all live here; the
//! engine above sees only domain values and typed errors.

pub mod auth;
pub mod client;
pub mod dto;
pub mod pacing;
pub mod session;

pub use auth::Endpoints;
pub use client::{ICloudClient, DEFAULT_TIMEOUT};
pub use pacing::RequestPacer;
pub use session::FileSessionStore;
