//! LNXPhotos Sync - reconciliation and download engine
//!
//! Composes the core's pure policies into the running system:
//!
//! - [`local_index`] - filesystem probing, partial files, atomic publication
//! - [`downloader`] - resumable streaming with length verification and
//!   mtime provenance
//! - [`sidecar`] - XMP sidecars and EXIF `DateTimeOriginal` injection
//! - [`iterator`] - added-date-descending iteration with early termination
//! - [`engine`] - the per-asset reconciliation decision function
//! - [`deleter`] - post-pass realization of delete intents
//! - [`watch`] - the authenticate/pass/wait state machine
//!
//! Everything here is single-connection, strictly sequential per account;
//! concurrency exists only between accounts, owned by the CLI driver.

pub mod deleter;
pub mod downloader;
pub mod engine;
pub mod iterator;
pub mod local_index;
pub mod sidecar;
pub mod watch;

pub use deleter::{DeletePlan, DeleteStats, DeletionPlanner, LocalDeleteIntent};
pub use downloader::{Downloaded, Downloader};
pub use engine::{PassOutcome, ReconcileEngine};
pub use iterator::AssetIterator;
pub use local_index::{DeleteOutcome, LocalIndex, LocalState, PartialHandle};
pub use watch::{LoopHandles, RunStats, SyncLoop};
