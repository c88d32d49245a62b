#![forbid(unsafe_code)]

//! # airlift
//!
//! Over-the-air application update engine: maintains a local catalog of
//! downloaded update bundles, decides which bundle should run on start,
//! fetches new bundles from a remote server, and reclaims storage occupied
//! by bundles no longer needed.
//!
//! ## Public contract
//!
//! The explicit public contract is [`UpdatesController`]: one controller per
//! process, constructed with an [`UpdatesConfig`] and an updates directory.
//! The controller serializes fetch cycles, owns the active selection policy
//! and configuration, and publishes progress and lifecycle transitions on
//! its [`EventBus`].
//!
//! ## Guarantees
//!
//! - A partially downloaded update is never observable as ready: the loader
//!   commits an update together with all of its assets in one catalog
//!   transaction, or not at all.
//! - Deletion never races a launch: the reaper only deletes what the active
//!   policy's retention decision excludes, and retention always includes the
//!   launched update.
//! - Policy and configuration swaps are atomic; an in-flight cycle keeps the
//!   snapshot it started with.

mod config;
mod controller;
mod error;
mod launcher;
mod loader;
mod reaper;
mod response;

pub use config::{ConfigError, UpdatesConfig};
pub use controller::{
    CheckResult, FetchOutcome, RelaunchListener, UpdatesController, UpdatesControllerBuilder,
};
pub use error::{UpdatesError, UpdatesResult};
pub use launcher::{EmbeddedAssets, LaunchError, LaunchedUpdate, Launcher};
pub use loader::{LoadResult, LoaderError, RemoteLoader};
pub use reaper::{ReapFailure, ReapReport, Reaper};
pub use response::{AssetDescriptor, ManifestPart, ResponseError, UpdateDirective, UpdateResponse};

pub use airlift_events::{Event, EventBus, LifecycleState, LoaderEvent, StateEvent};

/// HTTP transport layer re-export.
pub mod net {
    pub use airlift_net::*;
}

/// Selection policy re-export.
pub mod policy {
    pub use airlift_policy::*;
}

/// Catalog store re-export.
pub mod store {
    pub use airlift_store::*;
}
