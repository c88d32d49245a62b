#![forbid(unsafe_code)]

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    catalog::{Catalog, CatalogState},
    entity::{AssetHash, AssetRecord, UpdateId, UpdateRecord},
    error::StoreResult,
    fs,
};

const CATALOG_FILE: &str = "catalog.json";

/// Disk-backed catalog.
///
/// The whole catalog lives in memory behind one async mutex; every mutation
/// serializes the snapshot and writes it with write-temp-then-rename while
/// still holding the lock. That makes each [`Catalog`] call a transaction:
/// a crash leaves the previous snapshot on disk, never a partial one, and
/// concurrent callers observe mutations in a single total order.
#[derive(Debug)]
pub struct DiskCatalog {
    path: PathBuf,
    state: Mutex<CatalogState>,
}

impl DiskCatalog {
    /// Open (or create) the catalog under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) if an existing snapshot
    /// cannot be read or parsed.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        let path = dir.join(CATALOG_FILE);
        let state = if fs::exists(&path) {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            CatalogState::default()
        };
        debug!(path = %path.display(), "opened catalog");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the persisted snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &CatalogState) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        fs::atomic_write(&self.path, &bytes)
    }

    /// Apply a mutation to a copy of the state, persist the copy, and only
    /// then swap it in. A persist failure leaves both the snapshot file and
    /// the live handle on the previous state, so observers never see the
    /// effects of a failed call.
    async fn mutate<T>(&self, apply: impl FnOnce(&mut CatalogState) -> StoreResult<T>) -> StoreResult<T> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let out = apply(&mut next)?;
        self.persist(&next)?;
        *state = next;
        Ok(out)
    }
}

#[async_trait]
impl Catalog for DiskCatalog {
    async fn insert_update(&self, update: UpdateRecord) -> StoreResult<()> {
        self.mutate(|state| {
            state.insert_update(update);
            Ok(())
        })
        .await
    }

    async fn insert_asset(&self, asset: AssetRecord) -> StoreResult<()> {
        self.mutate(|state| {
            state.insert_asset(asset);
            Ok(())
        })
        .await
    }

    async fn mark_asset_present(&self, hash: AssetHash, relative_path: String) -> StoreResult<()> {
        self.mutate(|state| state.mark_asset_present(hash, relative_path))
            .await
    }

    async fn delete_update(&self, id: UpdateId) -> StoreResult<()> {
        self.mutate(|state| {
            state.delete_update(id);
            Ok(())
        })
        .await
    }

    async fn delete_asset(&self, hash: AssetHash) -> StoreResult<()> {
        self.mutate(|state| {
            state.delete_asset(hash);
            Ok(())
        })
        .await
    }

    async fn delete_asset_if_unreferenced(
        &self,
        hash: AssetHash,
        ignoring: &HashSet<UpdateId>,
    ) -> StoreResult<bool> {
        self.mutate(|state| Ok(state.delete_asset_if_unreferenced(hash, ignoring)))
            .await
    }

    async fn referencing_updates(&self, hash: AssetHash) -> StoreResult<Vec<UpdateId>> {
        Ok(self.state.lock().await.referencing_updates(hash))
    }

    async fn list_updates(&self) -> StoreResult<Vec<UpdateRecord>> {
        Ok(self.state.lock().await.updates.values().cloned().collect())
    }

    async fn list_assets(&self) -> StoreResult<Vec<AssetRecord>> {
        Ok(self.state.lock().await.assets.values().cloned().collect())
    }

    async fn update(&self, id: UpdateId) -> StoreResult<Option<UpdateRecord>> {
        Ok(self.state.lock().await.updates.get(&id).cloned())
    }

    async fn asset(&self, hash: AssetHash) -> StoreResult<Option<AssetRecord>> {
        Ok(self.state.lock().await.assets.get(&hash).cloned())
    }

    async fn assets_for_update(&self, id: UpdateId) -> StoreResult<Vec<AssetRecord>> {
        Ok(self.state.lock().await.assets_for_update(id))
    }

    async fn commit_update(
        &self,
        update: UpdateRecord,
        assets: Vec<AssetRecord>,
    ) -> StoreResult<()> {
        let update_id = update.id;
        self.mutate(|state| {
            state.commit_update(update, assets);
            Ok(())
        })
        .await?;
        debug!(update = %update_id, "committed update");
        Ok(())
    }
}
