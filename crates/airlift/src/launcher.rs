#![forbid(unsafe_code)]

//! Resolves a selected update into a concrete runnable asset map.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use airlift_store::{AssetHash, Catalog, StoreError, UpdateId, UpdateRecord, fs};
use thiserror::Error;
use tracing::debug;

/// Launch failures. Distinct from transport errors; launching never mutates
/// the catalog, so a failure has no side effects to undo.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("update {update} is incomplete: {} asset(s) unresolved", missing.len())]
    IncompleteBundle {
        update: UpdateId,
        missing: Vec<AssetHash>,
    },

    #[error("update {0} has no catalog assets")]
    NoAssets(UpdateId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Assets shipped inside the application build, keyed by content hash.
///
/// The launcher substitutes these for `embedded`-flagged assets that have no
/// downloaded file in the store.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedAssets {
    files: HashMap<AssetHash, PathBuf>,
}

impl EmbeddedAssets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, hash: AssetHash, path: impl Into<PathBuf>) {
        self.files.insert(hash, path.into());
    }

    #[must_use]
    pub fn get(&self, hash: &AssetHash) -> Option<&Path> {
        self.files.get(hash).map(PathBuf::as_path)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FromIterator<(AssetHash, PathBuf)> for EmbeddedAssets {
    fn from_iter<I: IntoIterator<Item = (AssetHash, PathBuf)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// A successfully resolved launch.
#[derive(Debug, Clone)]
pub struct LaunchedUpdate {
    pub update: UpdateRecord,
    /// Map from asset identity to resolved local path.
    pub asset_files: HashMap<AssetHash, PathBuf>,
    /// Resolved path of the asset the host executes.
    pub launch_asset_path: PathBuf,
    /// True if any asset resolved to the build's bundled copy.
    pub is_using_embedded_assets: bool,
}

impl LaunchedUpdate {
    #[must_use]
    pub fn manifest(&self) -> &serde_json::Value {
        &self.update.manifest
    }
}

/// Resolves updates against the catalog, the updates directory, and the
/// build's embedded assets.
pub struct Launcher {
    catalog: Arc<dyn Catalog>,
    updates_dir: PathBuf,
    embedded: EmbeddedAssets,
}

impl Launcher {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        updates_dir: impl Into<PathBuf>,
        embedded: EmbeddedAssets,
    ) -> Self {
        Self {
            catalog,
            updates_dir: updates_dir.into(),
            embedded,
        }
    }

    /// Resolve `update` into runnable asset paths.
    ///
    /// Fails deterministically, without partial side effects, if any
    /// non-embedded required asset is missing or its file does not exist on
    /// disk.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::IncompleteBundle`] listing every unresolved
    /// asset.
    pub async fn launch(&self, update: &UpdateRecord) -> Result<LaunchedUpdate, LaunchError> {
        let assets = self.catalog.assets_for_update(update.id).await?;
        if assets.is_empty() {
            return Err(LaunchError::NoAssets(update.id));
        }

        let mut asset_files = HashMap::new();
        let mut missing = Vec::new();
        let mut is_using_embedded_assets = false;

        for asset in &assets {
            let downloaded = asset
                .relative_path
                .as_deref()
                .map(|rel| self.updates_dir.join(rel))
                .filter(|path| fs::exists(path));

            match downloaded {
                Some(path) => {
                    asset_files.insert(asset.hash, path);
                }
                None => match (asset.embedded, self.embedded.get(&asset.hash)) {
                    (true, Some(path)) => {
                        is_using_embedded_assets = true;
                        asset_files.insert(asset.hash, path.to_path_buf());
                    }
                    _ => missing.push(asset.hash),
                },
            }
        }

        if !missing.is_empty() {
            return Err(LaunchError::IncompleteBundle {
                update: update.id,
                missing,
            });
        }

        let launch_asset_path = asset_files
            .get(&update.launch_asset)
            .cloned()
            .ok_or_else(|| LaunchError::IncompleteBundle {
                update: update.id,
                missing: vec![update.launch_asset],
            })?;

        debug!(update = %update.id, embedded = is_using_embedded_assets, "launch resolved");
        Ok(LaunchedUpdate {
            update: update.clone(),
            asset_files,
            launch_asset_path,
            is_using_embedded_assets,
        })
    }
}
