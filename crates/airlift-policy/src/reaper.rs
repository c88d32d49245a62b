#![forbid(unsafe_code)]

use std::collections::HashSet;

use airlift_store::{UpdateId, UpdateRecord, UpdateStatus};

/// Decides which updates the reaper must preserve. Everything outside the
/// returned set is reclaimable.
pub trait ReaperSelectionPolicy: Send + Sync {
    fn updates_to_retain(
        &self,
        all: &[UpdateRecord],
        launched: Option<&UpdateRecord>,
        next_selected: Option<&UpdateRecord>,
    ) -> HashSet<UpdateId>;
}

/// Default strategy: retain the launched update, the next selected update,
/// and every embedded record (embedded updates are never deletable).
#[derive(Debug, Default, Clone, Copy)]
pub struct RetainLaunchedAndNextPolicy;

impl ReaperSelectionPolicy for RetainLaunchedAndNextPolicy {
    fn updates_to_retain(
        &self,
        all: &[UpdateRecord],
        launched: Option<&UpdateRecord>,
        next_selected: Option<&UpdateRecord>,
    ) -> HashSet<UpdateId> {
        let mut retained: HashSet<UpdateId> = all
            .iter()
            .filter(|u| u.status == UpdateStatus::Embedded)
            .map(|u| u.id)
            .collect();
        retained.extend(launched.map(|u| u.id));
        retained.extend(next_selected.map(|u| u.id));
        retained
    }
}
