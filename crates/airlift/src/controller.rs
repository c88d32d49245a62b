#![forbid(unsafe_code)]

//! The controller: owns configuration, the active selection policy, and the
//! lifecycle state machine, and serializes fetch cycles.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError},
};

use airlift_events::{EventBus, LifecycleState, StateEvent};
use airlift_net::{DefaultRetryPolicy, HttpClient, Net, RetryNet, RetryPolicy};
use airlift_policy::{SelectionPolicy, SingleUpdatePolicy};
use airlift_store::{Catalog, DiskCatalog, StoreError};
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    config::UpdatesConfig,
    error::{UpdatesError, UpdatesResult},
    launcher::{EmbeddedAssets, LaunchedUpdate, Launcher},
    loader::{LoadResult, RemoteLoader},
    reaper::Reaper,
    response::{ManifestPart, UpdateResponse},
};

/// Host hook invoked when a relaunch is requested.
///
/// The controller cannot restart its host; it signals the registered
/// listener and the host performs the reload with the currently selected
/// update.
pub trait RelaunchListener: Send + Sync {
    fn on_relaunch_requested(&self);
}

/// Outcome of [`UpdatesController::check_for_update`].
#[derive(Debug, Clone)]
pub enum CheckResult {
    /// No update, or nothing the active policy would replace the current
    /// selection with.
    UpToDate,
    /// A manifest the active policy would download.
    UpdateAvailable(ManifestPart),
    /// The server directed a rollback to embedded assets.
    RollBackToEmbedded,
}

/// Outcome of a full fetch cycle.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Nothing new was downloaded or launched.
    UpToDate,
    /// The server directed a rollback; the host decides when to reload from
    /// embedded assets.
    RollBackToEmbedded,
    /// A new update was committed, selected, and resolved for launch.
    Launched(LaunchedUpdate),
}

struct ControllerState {
    config: UpdatesConfig,
    default_policy: SelectionPolicy,
    /// One-shot policy override installed by a configuration fetch.
    next_policy: Option<SelectionPolicy>,
    /// True between installing a pin and the launch that uses it; the pin
    /// survives exactly one successful launch, then reverts.
    pin_fresh: bool,
    launched: Option<LaunchedUpdate>,
    lifecycle: LifecycleState,
    relaunch_listener: Option<Box<dyn RelaunchListener>>,
}

/// One `UpdatesController` per process.
///
/// ## Normative
/// - At most one fetch cycle in flight; a concurrent request fails with
///   [`UpdatesError::LoadInProgress`] instead of queueing.
/// - Each cycle runs under a snapshot of the configuration and policy taken
///   at cycle start; swaps mid-cycle affect only later cycles.
/// - A configuration override is transactional: if the cycle run under it
///   fails in any way, the prior configuration is restored exactly.
/// - Dropping the controller cancels the root token; in-flight downloads
///   and background reaps abandon cooperatively.
pub struct UpdatesController {
    net: Arc<dyn Net>,
    catalog: Arc<dyn Catalog>,
    updates_dir: PathBuf,
    embedded: EmbeddedAssets,
    bus: EventBus,
    cancel: CancellationToken,
    fetch_gate: AsyncMutex<()>,
    concurrency: Option<usize>,
    state: Arc<StdMutex<ControllerState>>,
}

impl UpdatesController {
    #[must_use]
    pub fn builder(config: UpdatesConfig, updates_dir: impl Into<PathBuf>) -> UpdatesControllerBuilder {
        UpdatesControllerBuilder::new(config, updates_dir)
    }

    /// Subscribe to loader progress and lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<airlift_events::Event> {
        self.bus.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lock().lifecycle
    }

    /// The last successful launch, if any.
    #[must_use]
    pub fn launched_update(&self) -> Option<LaunchedUpdate> {
        self.lock().launched.clone()
    }

    #[must_use]
    pub fn config(&self) -> UpdatesConfig {
        self.lock().config.clone()
    }

    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Replace the default selection policy. An active one-shot pin is left
    /// in place and still reverts to the new default.
    pub fn set_selection_policy(&self, policy: SelectionPolicy) {
        self.lock().default_policy = policy;
    }

    pub fn set_relaunch_listener(&self, listener: Box<dyn RelaunchListener>) {
        self.lock().relaunch_listener = Some(listener);
    }

    pub fn clear_relaunch_listener(&self) {
        self.lock().relaunch_listener = None;
    }

    /// Ask the host to reload with the currently selected update.
    pub fn request_relaunch(&self) {
        self.set_lifecycle(LifecycleState::Restarting);
        let listener = self.lock().relaunch_listener.take();
        if let Some(listener) = listener {
            listener.on_relaunch_requested();
            let mut state = self.lock();
            // A listener installed during the callback wins.
            if state.relaunch_listener.is_none() {
                state.relaunch_listener = Some(listener);
            }
        }
    }

    /// Fetch and classify the remote response without downloading assets or
    /// touching the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`UpdatesError::LoadInProgress`] if a cycle is in flight, or
    /// a loader error for transport and parse failures.
    pub async fn check_for_update(&self) -> UpdatesResult<CheckResult> {
        let _gate = self
            .fetch_gate
            .try_lock()
            .map_err(|_| UpdatesError::LoadInProgress)?;
        let (config, policy, current) = self.cycle_snapshot();

        self.set_lifecycle(LifecycleState::Checking);
        let result = self.loader(config).load(|_| false).await;
        self.set_lifecycle(LifecycleState::Idle);

        match result? {
            LoadResult::NoUpdateAvailable => Ok(CheckResult::UpToDate),
            LoadResult::RollBackToEmbedded => Ok(CheckResult::RollBackToEmbedded),
            LoadResult::Declined { manifest } => {
                let fetched = manifest.to_update_record();
                if policy.should_replace(current.as_ref().map(|l| &l.update), &fetched) {
                    Ok(CheckResult::UpdateAvailable(manifest))
                } else {
                    Ok(CheckResult::UpToDate)
                }
            }
            // The declining hook never lets a download start.
            LoadResult::Loaded { .. } => Ok(CheckResult::UpToDate),
        }
    }

    /// Run one full cycle under the active configuration: fetch, download if
    /// the loader policy accepts the manifest, select, and launch.
    ///
    /// # Errors
    ///
    /// Returns [`UpdatesError::LoadInProgress`] if a cycle is in flight;
    /// loader, store, and launch errors otherwise. The catalog is unchanged
    /// on any pre-commit failure.
    pub async fn fetch_update(&self) -> UpdatesResult<FetchOutcome> {
        let _gate = self
            .fetch_gate
            .try_lock()
            .map_err(|_| UpdatesError::LoadInProgress)?;
        let (config, policy, current) = self.cycle_snapshot();

        let hook_state = Arc::clone(&self.state);
        let hook_bus = self.bus.clone();
        let hook_policy = policy.clone();
        let hook = move |response: &UpdateResponse| {
            let UpdateResponse::Manifest(part) = response else {
                return true;
            };
            let fetched = part.to_update_record();
            if hook_policy.should_replace(current.as_ref().map(|l| &l.update), &fetched) {
                set_lifecycle_in(&hook_state, &hook_bus, LifecycleState::Downloading);
                true
            } else {
                false
            }
        };

        self.set_lifecycle(LifecycleState::Checking);
        let load = self.loader(config.clone()).load(hook).await;

        match load {
            Err(e) => {
                self.set_lifecycle(LifecycleState::Idle);
                Err(e.into())
            }
            Ok(LoadResult::NoUpdateAvailable | LoadResult::Declined { .. }) => {
                self.set_lifecycle(LifecycleState::Idle);
                Ok(FetchOutcome::UpToDate)
            }
            Ok(LoadResult::RollBackToEmbedded) => {
                self.set_lifecycle(LifecycleState::Idle);
                Ok(FetchOutcome::RollBackToEmbedded)
            }
            Ok(LoadResult::Loaded { update }) => {
                debug!(update = %update.id, "update loaded, selecting for launch");
                self.select_and_launch(&config.runtime_version, &policy)
                    .await
                    .map(FetchOutcome::Launched)
            }
        }
    }

    /// Run one cycle under `config` instead of the active configuration.
    ///
    /// `config` is validated before anything is swapped, so an invalid
    /// override can never disturb the active state. On success the override
    /// becomes the active configuration and the fetched update is pinned and
    /// launched; the pin reverts after the next successful launch. On any
    /// failure the prior configuration is restored exactly.
    ///
    /// `on_manifest` sees the raw manifest and may decline the download, in
    /// which case nothing is mutated and the override still takes effect.
    ///
    /// # Errors
    ///
    /// Returns [`UpdatesError::Config`] for an invalid override before any
    /// state change; otherwise the same errors as [`fetch_update`](Self::fetch_update).
    pub async fn fetch_update_with_configuration<F>(
        &self,
        config: UpdatesConfig,
        on_manifest: F,
    ) -> UpdatesResult<FetchOutcome>
    where
        F: FnOnce(&serde_json::Value) -> bool + Send,
    {
        config.validate()?;
        let _gate = self
            .fetch_gate
            .try_lock()
            .map_err(|_| UpdatesError::LoadInProgress)?;

        let previous = {
            let mut state = self.lock();
            let previous = state.config.clone();
            state.config = config.clone();
            previous
        };

        let hook_state = Arc::clone(&self.state);
        let hook_bus = self.bus.clone();
        let hook = move |response: &UpdateResponse| {
            let UpdateResponse::Manifest(part) = response else {
                return true;
            };
            if on_manifest(part.raw()) {
                set_lifecycle_in(&hook_state, &hook_bus, LifecycleState::Downloading);
                true
            } else {
                false
            }
        };

        self.set_lifecycle(LifecycleState::Checking);
        let load = self.loader(config.clone()).load(hook).await;

        match load {
            Err(e) => {
                self.restore_config(previous);
                self.set_lifecycle(LifecycleState::Idle);
                Err(e.into())
            }
            Ok(LoadResult::NoUpdateAvailable | LoadResult::Declined { .. }) => {
                self.set_lifecycle(LifecycleState::Idle);
                Ok(FetchOutcome::UpToDate)
            }
            Ok(LoadResult::RollBackToEmbedded) => {
                self.set_lifecycle(LifecycleState::Idle);
                Ok(FetchOutcome::RollBackToEmbedded)
            }
            Ok(LoadResult::Loaded { update }) => {
                // Pin exactly the fetched update for the launch that follows.
                let pinned = {
                    let mut state = self.lock();
                    let pinned = state
                        .default_policy
                        .with_launcher(Arc::new(SingleUpdatePolicy::new(update.id)));
                    state.next_policy = Some(pinned.clone());
                    state.pin_fresh = true;
                    pinned
                };

                match self.select_and_launch(&config.runtime_version, &pinned).await {
                    Ok(launched) => Ok(FetchOutcome::Launched(launched)),
                    Err(e) => {
                        let mut state = self.lock();
                        state.config = previous;
                        state.next_policy = None;
                        state.pin_fresh = false;
                        drop(state);
                        Err(e)
                    }
                }
            }
        }
    }

    /// Select against the catalog and resolve the launch. On success the
    /// result is recorded, a background reap is spawned, and a spent
    /// one-shot pin reverts.
    async fn select_and_launch(
        &self,
        runtime_version: &str,
        policy: &SelectionPolicy,
    ) -> UpdatesResult<LaunchedUpdate> {
        let candidates = self.catalog.list_updates().await.map_err(UpdatesError::Store)?;
        let Some(selected) = policy.select_update_to_launch(&candidates, runtime_version) else {
            self.set_lifecycle(LifecycleState::LaunchFailed);
            return Err(UpdatesError::NoLaunchableUpdate {
                runtime_version: runtime_version.to_string(),
            });
        };

        let launcher = Launcher::new(
            Arc::clone(&self.catalog),
            &self.updates_dir,
            self.embedded.clone(),
        );
        match launcher.launch(&selected).await {
            Ok(launched) => {
                let retain_policy = {
                    let mut state = self.lock();
                    state.launched = Some(launched.clone());
                    if state.pin_fresh {
                        state.pin_fresh = false;
                    } else {
                        state.next_policy = None;
                    }
                    state.active_policy()
                };
                self.set_lifecycle(LifecycleState::Ready);
                self.spawn_reap(retain_policy, runtime_version.to_string(), launched.clone());
                Ok(launched)
            }
            Err(e) => {
                self.set_lifecycle(LifecycleState::LaunchFailed);
                Err(e.into())
            }
        }
    }

    /// Fire-and-forget reap of everything the retention decision excludes.
    /// Retention is computed with the post-launch active policy and always
    /// includes the just-launched update, so deletion never races the launch
    /// or the next selection.
    fn spawn_reap(&self, policy: SelectionPolicy, runtime_version: String, launched: LaunchedUpdate) {
        let catalog = Arc::clone(&self.catalog);
        let updates_dir = self.updates_dir.clone();
        let cancel = self.cancel.child_token();

        tokio::spawn(async move {
            let pass = async {
                let all = catalog.list_updates().await?;
                let next = policy.select_update_to_launch(&all, &runtime_version);
                let retained =
                    policy.updates_to_retain(&all, Some(&launched.update), next.as_ref());
                Reaper::new(catalog, updates_dir).reap(&retained).await
            };
            tokio::select! {
                () = cancel.cancelled() => debug!("reap abandoned on shutdown"),
                result = pass => match result {
                    Ok(report) => debug!(
                        updates = report.deleted_updates.len(),
                        assets = report.deleted_assets.len(),
                        failures = report.failures.len(),
                        "background reap finished"
                    ),
                    Err(e) => warn!(error = %e, "background reap failed"),
                },
            }
        });
    }

    fn loader(&self, config: UpdatesConfig) -> RemoteLoader {
        let loader = RemoteLoader::new(
            Arc::clone(&self.net),
            Arc::clone(&self.catalog),
            config,
            &self.updates_dir,
            self.bus.clone(),
            self.cancel.child_token(),
        );
        match self.concurrency {
            Some(n) => loader.with_concurrency(n),
            None => loader,
        }
    }

    /// Configuration, policy, and launch snapshot a cycle runs under.
    fn cycle_snapshot(&self) -> (UpdatesConfig, SelectionPolicy, Option<LaunchedUpdate>) {
        let state = self.lock();
        (state.config.clone(), state.active_policy(), state.launched.clone())
    }

    fn set_lifecycle(&self, lifecycle: LifecycleState) {
        set_lifecycle_in(&self.state, &self.bus, lifecycle);
    }

    fn restore_config(&self, previous: UpdatesConfig) {
        self.lock().config = previous;
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ControllerState {
    fn active_policy(&self) -> SelectionPolicy {
        self.next_policy
            .clone()
            .unwrap_or_else(|| self.default_policy.clone())
    }
}

fn set_lifecycle_in(
    state: &StdMutex<ControllerState>,
    bus: &EventBus,
    lifecycle: LifecycleState,
) {
    state
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .lifecycle = lifecycle;
    bus.publish(StateEvent::from(lifecycle));
}

impl Drop for UpdatesController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for UpdatesController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdatesController")
            .field("updates_dir", &self.updates_dir)
            .field("state", &self.state.lock().map(|s| s.lifecycle))
            .finish_non_exhaustive()
    }
}

/// Builder for [`UpdatesController`]. Only the configuration and updates
/// directory are required; everything else has production defaults.
pub struct UpdatesControllerBuilder {
    config: UpdatesConfig,
    updates_dir: PathBuf,
    catalog: Option<Arc<dyn Catalog>>,
    net: Option<Arc<dyn Net>>,
    embedded: EmbeddedAssets,
    policy: SelectionPolicy,
    bus: Option<EventBus>,
    concurrency: Option<usize>,
}

impl UpdatesControllerBuilder {
    #[must_use]
    pub fn new(config: UpdatesConfig, updates_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            updates_dir: updates_dir.into(),
            catalog: None,
            net: None,
            embedded: EmbeddedAssets::new(),
            policy: SelectionPolicy::default(),
            bus: None,
            concurrency: None,
        }
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    #[must_use]
    pub fn with_net(mut self, net: Arc<dyn Net>) -> Self {
        self.net = Some(net);
        self
    }

    #[must_use]
    pub fn with_embedded_assets(mut self, embedded: EmbeddedAssets) -> Self {
        self.embedded = embedded;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    #[must_use]
    pub fn with_download_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Build the controller. Defaults: a [`DiskCatalog`] under the updates
    /// directory, and an [`HttpClient`] wrapped in retry-on-transient.
    ///
    /// # Errors
    ///
    /// Returns [`UpdatesError::Config`] for an invalid configuration, or a
    /// store error if the updates directory or catalog cannot be opened.
    pub fn build(self) -> UpdatesResult<UpdatesController> {
        self.config.validate().map_err(UpdatesError::Config)?;

        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => {
                std::fs::create_dir_all(&self.updates_dir).map_err(StoreError::from)?;
                Arc::new(DiskCatalog::open(&self.updates_dir)?)
            }
        };
        let net: Arc<dyn Net> = match self.net {
            Some(net) => net,
            None => Arc::new(RetryNet::new(
                HttpClient::default(),
                DefaultRetryPolicy::new(RetryPolicy::default()),
            )),
        };

        Ok(UpdatesController {
            net,
            catalog,
            updates_dir: self.updates_dir,
            embedded: self.embedded,
            bus: self.bus.unwrap_or_default(),
            cancel: CancellationToken::new(),
            fetch_gate: AsyncMutex::new(()),
            concurrency: self.concurrency,
            state: Arc::new(StdMutex::new(ControllerState {
                config: self.config,
                default_policy: self.policy,
                next_policy: None,
                pin_fresh: false,
                launched: None,
                lifecycle: LifecycleState::Idle,
                relaunch_listener: None,
            })),
        })
    }
}
