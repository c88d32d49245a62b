#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    entity::{AssetHash, AssetRecord, UpdateId, UpdateRecord},
    error::{StoreError, StoreResult},
};

/// Transactional catalog of updates, assets, and their relations.
///
/// ## Normative
/// - Every call is atomic: observers (and the persisted snapshot, for disk
///   catalogs) see all of a call's effects or none of them.
/// - Multi-row sequences that must be atomic go through [`commit_update`](Catalog::commit_update);
///   callers never simulate a transaction out of individual inserts.
/// - Deletes are idempotent. `mark_asset_present` on an unknown asset is an
///   error because it indicates a loader bug, not a race.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn insert_update(&self, update: UpdateRecord) -> StoreResult<()>;

    /// Insert an asset if it is not already known. An existing record wins:
    /// a re-insert never clears a `relative_path` set by a previous download.
    async fn insert_asset(&self, asset: AssetRecord) -> StoreResult<()>;

    async fn mark_asset_present(&self, hash: AssetHash, relative_path: String) -> StoreResult<()>;

    async fn delete_update(&self, id: UpdateId) -> StoreResult<()>;

    async fn delete_asset(&self, hash: AssetHash) -> StoreResult<()>;

    /// Delete the asset record only if no update outside `ignoring`
    /// references it, checked and applied under one lock. Returns whether
    /// the record was deleted.
    ///
    /// This is the reaper's record-delete primitive: `ignoring` holds the
    /// updates the reaper is about to delete, so a commit that re-references
    /// the asset concurrently keeps the record alive.
    async fn delete_asset_if_unreferenced(
        &self,
        hash: AssetHash,
        ignoring: &HashSet<UpdateId>,
    ) -> StoreResult<bool>;

    /// Every update whose relation list contains `hash`.
    async fn referencing_updates(&self, hash: AssetHash) -> StoreResult<Vec<UpdateId>>;

    async fn list_updates(&self) -> StoreResult<Vec<UpdateRecord>>;

    async fn list_assets(&self) -> StoreResult<Vec<AssetRecord>>;

    async fn update(&self, id: UpdateId) -> StoreResult<Option<UpdateRecord>>;

    async fn asset(&self, hash: AssetHash) -> StoreResult<Option<AssetRecord>>;

    async fn assets_for_update(&self, id: UpdateId) -> StoreResult<Vec<AssetRecord>>;

    /// Commit an update together with its assets and relations in one
    /// transaction: the update row, every asset row, and the relation list
    /// become visible together, or not at all.
    async fn commit_update(
        &self,
        update: UpdateRecord,
        assets: Vec<AssetRecord>,
    ) -> StoreResult<()>;
}

/// Whole-catalog snapshot shared by the disk and memory backends.
///
/// All mutation logic lives here so both backends apply identical semantics;
/// the backends differ only in whether a mutation is followed by a persist.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct CatalogState {
    pub(crate) updates: BTreeMap<UpdateId, UpdateRecord>,
    pub(crate) assets: BTreeMap<AssetHash, AssetRecord>,
    pub(crate) relations: BTreeMap<UpdateId, Vec<AssetHash>>,
}

impl CatalogState {
    pub(crate) fn insert_update(&mut self, update: UpdateRecord) {
        self.updates.insert(update.id, update);
    }

    pub(crate) fn insert_asset(&mut self, asset: AssetRecord) {
        self.assets.entry(asset.hash).or_insert(asset);
    }

    pub(crate) fn mark_asset_present(
        &mut self,
        hash: AssetHash,
        relative_path: String,
    ) -> StoreResult<()> {
        let asset = self
            .assets
            .get_mut(&hash)
            .ok_or(StoreError::UnknownAsset(hash))?;
        asset.relative_path = Some(relative_path);
        Ok(())
    }

    pub(crate) fn delete_update(&mut self, id: UpdateId) {
        self.updates.remove(&id);
        self.relations.remove(&id);
    }

    pub(crate) fn delete_asset(&mut self, hash: AssetHash) {
        self.assets.remove(&hash);
    }

    pub(crate) fn delete_asset_if_unreferenced(
        &mut self,
        hash: AssetHash,
        ignoring: &HashSet<UpdateId>,
    ) -> bool {
        let referenced = self
            .relations
            .iter()
            .any(|(id, hashes)| !ignoring.contains(id) && hashes.contains(&hash));
        if referenced {
            return false;
        }
        self.assets.remove(&hash);
        true
    }

    pub(crate) fn referencing_updates(&self, hash: AssetHash) -> Vec<UpdateId> {
        self.relations
            .iter()
            .filter(|(_, hashes)| hashes.contains(&hash))
            .map(|(id, _)| *id)
            .collect()
    }

    pub(crate) fn assets_for_update(&self, id: UpdateId) -> Vec<AssetRecord> {
        self.relations
            .get(&id)
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|h| self.assets.get(h).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn commit_update(&mut self, update: UpdateRecord, assets: Vec<AssetRecord>) {
        let hashes: Vec<AssetHash> = assets.iter().map(|a| a.hash).collect();
        for asset in assets {
            // Merge: keep an existing present path, adopt one we did not have.
            match self.assets.get_mut(&asset.hash) {
                Some(existing) => {
                    if existing.relative_path.is_none() {
                        existing.relative_path = asset.relative_path;
                    }
                }
                None => {
                    self.assets.insert(asset.hash, asset);
                }
            }
        }
        self.relations.insert(update.id, hashes);
        self.updates.insert(update.id, update);
    }
}
