#![forbid(unsafe_code)]

//! # airlift-store
//!
//! Persistent catalog of updates and their assets.
//!
//! ## Public contract
//!
//! The [`Catalog`] trait is the transaction boundary consumed by the loader,
//! launcher, and reaper. Every trait call is atomic: after it returns, the
//! persisted catalog reflects either all of the call's effects or none of
//! them. Multi-row sequences that must be atomic (an update plus its assets
//! plus their relations) go through [`Catalog::commit_update`], never through
//! individual inserts.
//!
//! ## Disk mapping
//!
//! [`DiskCatalog`] keeps the whole catalog as one in-memory snapshot and
//! persists each mutation as a single JSON file written via the
//! write-temp-then-rename pattern (`catalog.json` next to the asset files).
//! A crash leaves either the old snapshot or the new one, never a partial
//! write. [`MemCatalog`] is the same state machine without persistence.

mod catalog;
mod disk;
mod entity;
mod error;
pub mod fs;
mod mem;

pub use catalog::Catalog;
pub use disk::DiskCatalog;
pub use entity::{AssetHash, AssetRecord, UpdateId, UpdateRecord, UpdateStatus};
pub use error::{StoreError, StoreResult};
pub use mem::MemCatalog;
