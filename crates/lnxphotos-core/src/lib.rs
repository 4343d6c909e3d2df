//! LNXPhotos Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Asset`, `Rendition`, validated identifiers
//! - **Pure policies** - naming (canonical/admissible paths), version
//!   selection, configuration validation
//! - **Port definitions** - Traits for adapters: `IPhotoService`,
//!   `ICredentialProvider`, `ISessionStore`, `INotifier`, `IEventSink`
//! - **Error taxonomy** - `SyncError` with loop-level classification
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture
//! pattern. The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement. The
//! reconciliation engine in `lnxphotos-sync` orchestrates domain policies
//! through the port interfaces.

pub mod config;
pub mod domain;
pub mod error;
pub mod naming;
pub mod ports;
pub mod selector;

pub use error::{ErrorClass, SyncError};
