#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::sync::Arc;

use airlift_store::{UpdateId, UpdateRecord};

use crate::{
    launcher::{LauncherSelectionPolicy, NewestUpdatePolicy},
    loader::{LoaderSelectionPolicy, NewerUpdatePolicy},
    reaper::{ReaperSelectionPolicy, RetainLaunchedAndNextPolicy},
};

/// The active policy value: one launcher, one loader, and one reaper
/// strategy, independently swappable.
///
/// Cheap to clone; the controller hands each cycle a clone taken at cycle
/// start, so a swap mid-cycle never changes an in-progress decision.
#[derive(Clone)]
pub struct SelectionPolicy {
    launcher: Arc<dyn LauncherSelectionPolicy>,
    loader: Arc<dyn LoaderSelectionPolicy>,
    reaper: Arc<dyn ReaperSelectionPolicy>,
}

impl SelectionPolicy {
    pub fn new(
        launcher: Arc<dyn LauncherSelectionPolicy>,
        loader: Arc<dyn LoaderSelectionPolicy>,
        reaper: Arc<dyn ReaperSelectionPolicy>,
    ) -> Self {
        Self {
            launcher,
            loader,
            reaper,
        }
    }

    /// Replace only the launcher strategy, keeping loader and reaper.
    #[must_use]
    pub fn with_launcher(&self, launcher: Arc<dyn LauncherSelectionPolicy>) -> Self {
        Self {
            launcher,
            loader: Arc::clone(&self.loader),
            reaper: Arc::clone(&self.reaper),
        }
    }

    pub fn select_update_to_launch(
        &self,
        candidates: &[UpdateRecord],
        runtime_version: &str,
    ) -> Option<UpdateRecord> {
        self.launcher
            .select_update_to_launch(candidates, runtime_version)
    }

    pub fn should_replace(&self, current: Option<&UpdateRecord>, fetched: &UpdateRecord) -> bool {
        self.loader.should_replace(current, fetched)
    }

    pub fn updates_to_retain(
        &self,
        all: &[UpdateRecord],
        launched: Option<&UpdateRecord>,
        next_selected: Option<&UpdateRecord>,
    ) -> HashSet<UpdateId> {
        self.reaper.updates_to_retain(all, launched, next_selected)
    }
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::new(
            Arc::new(NewestUpdatePolicy),
            Arc::new(NewerUpdatePolicy),
            Arc::new(RetainLaunchedAndNextPolicy),
        )
    }
}

impl std::fmt::Debug for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionPolicy").finish_non_exhaustive()
    }
}
