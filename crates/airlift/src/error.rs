#![forbid(unsafe_code)]

use airlift_store::StoreError;
use thiserror::Error;

use crate::{config::ConfigError, launcher::LaunchError, loader::LoaderError};

/// Top-level controller errors.
///
/// None of these abort the host process; the controller returns to a
/// consistent state before surfacing any of them.
#[derive(Debug, Error)]
pub enum UpdatesError {
    /// Invalid configuration, surfaced before any network or state change.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The load cycle finished but the active policy selected no launchable
    /// update for the configured runtime version.
    #[error("no launchable update for runtime version {runtime_version}")]
    NoLaunchableUpdate { runtime_version: String },

    /// Another fetch cycle is already in flight on this controller.
    #[error("a load is already in progress")]
    LoadInProgress,
}

pub type UpdatesResult<T> = Result<T, UpdatesError>;
