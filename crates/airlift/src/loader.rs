#![forbid(unsafe_code)]

//! Remote load cycle: fetch the update response, discriminate directive vs.
//! manifest, download missing assets with bounded parallelism and hash
//! verification, and commit the result in one catalog transaction.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use airlift_events::{EventBus, LoaderEvent};
use airlift_net::{Net, NetError};
use airlift_store::{AssetHash, AssetRecord, Catalog, StoreError, UpdateRecord, fs};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    config::UpdatesConfig,
    response::{AssetDescriptor, ManifestPart, ResponseError, UpdateDirective, UpdateResponse},
};

const DEFAULT_CONCURRENCY: usize = 4;
const ASSETS_SUBDIR: &str = "assets";

/// Load cycle errors.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("transport error: {0}")]
    Net(#[from] NetError),

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("asset hash mismatch for {url}: expected {expected}, got {actual}")]
    HashMismatch {
        url: url::Url,
        expected: AssetHash,
        actual: AssetHash,
    },

    /// The caller cancelled the cycle. Distinct from a download failure;
    /// the catalog is untouched.
    #[error("load cancelled")]
    Cancelled,
}

/// Outcome of one load cycle.
#[derive(Debug, Clone)]
pub enum LoadResult {
    /// Remote directive: keep the current update.
    NoUpdateAvailable,
    /// Remote directive: run from embedded assets; no new update.
    RollBackToEmbedded,
    /// The response carried a manifest but the caller's hook declined the
    /// download. No catalog mutation.
    Declined { manifest: ManifestPart },
    /// The manifest's update is committed with all of its assets present.
    Loaded { update: UpdateRecord },
}

/// Orchestrates one remote fetch cycle against a configuration snapshot.
///
/// ## Normative
/// - Never commits a partially downloaded update: any asset failure aborts
///   the cycle before the single `commit_update` transaction.
/// - Progress is published on the shared event bus after every per-asset
///   completion; the bus outlives individual subscribers.
/// - Cancellation abandons in-flight downloads (temp bytes are discarded on
///   drop) and surfaces [`LoaderError::Cancelled`].
pub struct RemoteLoader {
    net: Arc<dyn Net>,
    catalog: Arc<dyn Catalog>,
    config: UpdatesConfig,
    updates_dir: PathBuf,
    bus: EventBus,
    cancel: CancellationToken,
    concurrency: usize,
}

impl RemoteLoader {
    pub fn new(
        net: Arc<dyn Net>,
        catalog: Arc<dyn Catalog>,
        config: UpdatesConfig,
        updates_dir: impl Into<PathBuf>,
        bus: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            net,
            catalog,
            config,
            updates_dir: updates_dir.into(),
            bus,
            cancel,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run one load cycle.
    ///
    /// `on_response` is invoked once the response's logical part (directive
    /// or manifest) is known; its return controls whether asset download
    /// proceeds for a manifest part. Directives carry no assets, so their
    /// hook result is informational only.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError`]; on any error the catalog is unchanged.
    pub async fn load<F>(&self, on_response: F) -> Result<LoadResult, LoaderError>
    where
        F: FnOnce(&UpdateResponse) -> bool + Send,
    {
        if self.cancel.is_cancelled() {
            return Err(LoaderError::Cancelled);
        }

        let bytes = self
            .net
            .get_bytes(
                self.config.update_url.clone(),
                Some(self.config.manifest_headers()),
            )
            .await?;
        let response = UpdateResponse::parse(&bytes)?;

        let should_download = on_response(&response);

        let part = match response {
            UpdateResponse::Directive(UpdateDirective::NoUpdateAvailable) => {
                debug!("remote directive: no update available");
                return Ok(LoadResult::NoUpdateAvailable);
            }
            UpdateResponse::Directive(UpdateDirective::RollBackToEmbedded) => {
                debug!("remote directive: roll back to embedded");
                return Ok(LoadResult::RollBackToEmbedded);
            }
            UpdateResponse::Manifest(part) => part,
        };

        if !should_download {
            return Ok(LoadResult::Declined { manifest: part });
        }

        // Idempotent re-fetch: the update is already committed with all of
        // its assets, nothing to download.
        if let Some(existing) = self.catalog.update(part.update_id()).await? {
            debug!(update = %existing.id, "manifest already committed, skipping download");
            return Ok(LoadResult::Loaded { update: existing });
        }

        let update = part.to_update_record();
        let assets = self.download_missing_assets(&part).await?;
        self.catalog.commit_update(update.clone(), assets).await?;
        self.bus.publish(LoaderEvent::UpdateCommitted {
            update_id: update.id.0,
        });

        Ok(LoadResult::Loaded { update })
    }

    /// Download every required asset not already present, with bounded
    /// parallelism. Returns the full asset record set for the commit
    /// (downloaded, reused, and embedded-only records).
    async fn download_missing_assets(
        &self,
        part: &ManifestPart,
    ) -> Result<Vec<AssetRecord>, LoaderError> {
        let mut records: Vec<AssetRecord> = Vec::new();
        let mut to_download: Vec<AssetDescriptor> = Vec::new();

        for descriptor in part.required_assets() {
            if let Some(asset) = self.catalog.asset(descriptor.hash).await? {
                let present_on_disk = asset
                    .relative_path
                    .as_deref()
                    .map(|rel| fs::exists(&self.updates_dir.join(rel)))
                    .unwrap_or(false);
                if present_on_disk {
                    // Reuse: an asset shared with a previous update.
                    records.push(asset);
                    continue;
                }
            }

            if descriptor.embedded {
                // Shipped with the build; the launcher resolves the bundled
                // copy, no download needed.
                records.push(descriptor.to_record(None));
            } else {
                to_download.push(descriptor.clone());
            }
        }

        if to_download.is_empty() {
            return Ok(records);
        }

        let total = u32::try_from(to_download.len()).unwrap_or(u32::MAX);
        let successful = Arc::new(AtomicU32::new(0));
        let failed = Arc::new(AtomicU32::new(0));
        let dl_cancel = self.cancel.child_token();

        let downloads = futures::stream::iter(to_download.into_iter().map(|descriptor| {
            let net = Arc::clone(&self.net);
            let headers = self.config.asset_headers();
            let assets_dir = self.updates_dir.join(ASSETS_SUBDIR);
            let cancel = dl_cancel.clone();
            let bus = self.bus.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            async move {
                let result =
                    download_one_asset(net.as_ref(), &assets_dir, &descriptor, headers, &cancel)
                        .await;
                match &result {
                    Ok(_) => successful.fetch_add(1, Ordering::SeqCst),
                    Err(_) => failed.fetch_add(1, Ordering::SeqCst),
                };
                bus.publish(LoaderEvent::DownloadProgress {
                    successful: successful.load(Ordering::SeqCst),
                    failed: failed.load(Ordering::SeqCst),
                    total,
                });
                result
            }
        }))
        .buffer_unordered(self.concurrency);
        futures::pin_mut!(downloads);

        while let Some(result) = downloads.next().await {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    // First failure aborts the whole cycle; dropping the
                    // stream abandons in-flight downloads and their temp
                    // files. Nothing was committed.
                    dl_cancel.cancel();
                    if matches!(e, LoaderError::Cancelled) && !self.cancel.is_cancelled() {
                        // A sibling failure raced us; keep draining for the
                        // real error.
                        continue;
                    }
                    // A caller-initiated cancel is not a failure; only real
                    // download errors reach subscribers.
                    if !matches!(e, LoaderError::Cancelled) {
                        self.bus.publish(LoaderEvent::LoadFailed {
                            error: e.to_string(),
                        });
                    }
                    return Err(e);
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Err(LoaderError::Cancelled);
        }

        Ok(records)
    }
}

/// Stream one asset into a temp file while hashing, verify the declared
/// content hash, then atomically rename into the content-addressed location.
async fn download_one_asset(
    net: &dyn Net,
    assets_dir: &Path,
    descriptor: &AssetDescriptor,
    headers: airlift_net::Headers,
    cancel: &CancellationToken,
) -> Result<AssetRecord, LoaderError> {
    std::fs::create_dir_all(assets_dir)?;

    // The connect itself can stall on an unresponsive server, so it races
    // the token like every chunk read below.
    let mut stream = tokio::select! {
        () = cancel.cancelled() => {
            debug!(url = %descriptor.url, "asset download cancelled");
            return Err(LoaderError::Cancelled);
        }
        opened = net.stream(descriptor.url.clone(), Some(headers)) => opened?,
    };
    let mut tmp = tempfile::NamedTempFile::new_in(assets_dir)?;
    let mut hasher = Sha256::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(url = %descriptor.url, "asset download cancelled");
                return Err(LoaderError::Cancelled);
            }
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    hasher.update(&bytes);
                    std::io::Write::write_all(&mut tmp, &bytes)?;
                }
                Some(Err(e)) => {
                    warn!(url = %descriptor.url, error = %e, "asset download failed");
                    return Err(e.into());
                }
                None => break,
            }
        }
    }

    let actual = AssetHash::from_digest(hasher.finalize().into());
    if actual != descriptor.hash {
        warn!(url = %descriptor.url, expected = %descriptor.hash, actual = %actual, "asset hash mismatch");
        return Err(LoaderError::HashMismatch {
            url: descriptor.url.clone(),
            expected: descriptor.hash,
            actual,
        });
    }

    let relative = asset_relative_path(&descriptor.hash);
    let target = assets_dir.join(descriptor.hash.to_hex());
    tmp.persist(&target).map_err(|e| LoaderError::Io(e.error))?;
    debug!(url = %descriptor.url, path = %target.display(), "asset downloaded");

    Ok(descriptor.to_record(Some(relative)))
}

/// Path of an asset's verified bytes, relative to the updates directory.
#[must_use]
pub(crate) fn asset_relative_path(hash: &AssetHash) -> String {
    format!("{ASSETS_SUBDIR}/{hash}")
}
