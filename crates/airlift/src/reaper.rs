#![forbid(unsafe_code)]

//! Safe deletion of updates and assets outside the retained set.
//!
//! Deletion order is filesystem-first, store-second: an orphan asset's file
//! is deleted (or found already absent) before its catalog record, and
//! update rows go last. A crash mid-reap leaves at worst a record pointing
//! at an already-deleted file, which a later pass detects and reclaims.
//! A dangling file with no record cannot occur.

use std::{
    collections::HashSet,
    path::PathBuf,
    sync::Arc,
};

use airlift_store::{AssetHash, Catalog, StoreResult, UpdateId, fs};
use tracing::{debug, warn};

/// One per-item failure during a reap pass. Non-fatal; the pass continues.
#[derive(Debug, Clone)]
pub struct ReapFailure {
    pub asset: AssetHash,
    pub error: String,
}

/// What a reap pass deleted and what it could not.
#[derive(Debug, Clone, Default)]
pub struct ReapReport {
    pub deleted_updates: Vec<UpdateId>,
    pub deleted_assets: Vec<AssetHash>,
    pub failures: Vec<ReapFailure>,
}

/// Deletes everything the retention decision excludes.
pub struct Reaper {
    catalog: Arc<dyn Catalog>,
    updates_dir: PathBuf,
}

impl Reaper {
    pub fn new(catalog: Arc<dyn Catalog>, updates_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            updates_dir: updates_dir.into(),
        }
    }

    /// Delete every persisted update outside `retained`, plus every asset
    /// referenced only by those doomed updates (or by nothing at all, so
    /// records stranded by an earlier crash are reclaimed too).
    ///
    /// The doomed set is fixed at pass start, but each asset's referencers
    /// are re-read from the catalog at delete time and the record delete is
    /// conditional under the store lock. An update committed while the pass
    /// runs references its assets before they are considered here, so its
    /// files and records are left alone.
    ///
    /// # Errors
    ///
    /// Returns a store error only for catalog reads/writes; per-asset file
    /// delete failures are recorded in the report instead.
    pub async fn reap(&self, retained: &HashSet<UpdateId>) -> StoreResult<ReapReport> {
        let doomed: HashSet<UpdateId> = self
            .catalog
            .list_updates()
            .await?
            .iter()
            .filter(|u| !retained.contains(&u.id))
            .map(|u| u.id)
            .collect();

        let mut report = ReapReport::default();

        // Assets first: file, then record. Update rows are deleted last so
        // a crash before this point leaves their assets referenced and thus
        // conservatively retained by the *next* pass's computation.
        for asset in self.catalog.list_assets().await? {
            let referencers = self.catalog.referencing_updates(asset.hash).await?;
            if referencers.iter().any(|id| !doomed.contains(id)) {
                continue;
            }

            if let Some(rel) = asset.relative_path.as_deref() {
                let path = self.updates_dir.join(rel);
                if let Err(e) = fs::remove_file(&path) {
                    warn!(asset = %asset.hash, path = %path.display(), error = %e, "asset file delete failed");
                    report.failures.push(ReapFailure {
                        asset: asset.hash,
                        error: e.to_string(),
                    });
                    // Keep the record so the file stays reclaimable.
                    continue;
                }
            }

            // Re-checked under the store lock: a commit that re-referenced
            // this asset since the read above keeps the record.
            if self
                .catalog
                .delete_asset_if_unreferenced(asset.hash, &doomed)
                .await?
            {
                report.deleted_assets.push(asset.hash);
            }
        }

        for id in doomed {
            self.catalog.delete_update(id).await?;
            report.deleted_updates.push(id);
        }

        debug!(
            updates = report.deleted_updates.len(),
            assets = report.deleted_assets.len(),
            failures = report.failures.len(),
            "reap pass finished"
        );
        Ok(report)
    }
}
