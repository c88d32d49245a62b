#![forbid(unsafe_code)]

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    catalog::{Catalog, CatalogState},
    entity::{AssetHash, AssetRecord, UpdateId, UpdateRecord},
    error::StoreResult,
};

/// In-memory catalog backend.
///
/// Same semantics as [`DiskCatalog`](crate::DiskCatalog) without persistence.
/// Used by tests and ephemeral hosts.
#[derive(Debug, Default)]
pub struct MemCatalog {
    state: Mutex<CatalogState>,
}

impl MemCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Catalog for MemCatalog {
    async fn insert_update(&self, update: UpdateRecord) -> StoreResult<()> {
        self.state.lock().await.insert_update(update);
        Ok(())
    }

    async fn insert_asset(&self, asset: AssetRecord) -> StoreResult<()> {
        self.state.lock().await.insert_asset(asset);
        Ok(())
    }

    async fn mark_asset_present(&self, hash: AssetHash, relative_path: String) -> StoreResult<()> {
        self.state.lock().await.mark_asset_present(hash, relative_path)
    }

    async fn delete_update(&self, id: UpdateId) -> StoreResult<()> {
        self.state.lock().await.delete_update(id);
        Ok(())
    }

    async fn delete_asset(&self, hash: AssetHash) -> StoreResult<()> {
        self.state.lock().await.delete_asset(hash);
        Ok(())
    }

    async fn delete_asset_if_unreferenced(
        &self,
        hash: AssetHash,
        ignoring: &HashSet<UpdateId>,
    ) -> StoreResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .delete_asset_if_unreferenced(hash, ignoring))
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
        self.state.lock().await.commit_update(update, assets);
        Ok(())
    }
}
