#![forbid(unsafe_code)]

use airlift_store::UpdateRecord;

/// Decides whether a freshly fetched manifest should replace what would
/// otherwise launch.
pub trait LoaderSelectionPolicy: Send + Sync {
    fn should_replace(&self, current: Option<&UpdateRecord>, fetched: &UpdateRecord) -> bool;
}

/// Default strategy: accept iff the fetched update is strictly newer than
/// the current one by commit time. With no current update, always accept.
#[derive(Debug, Default, Clone, Copy)]
pub struct NewerUpdatePolicy;

impl LoaderSelectionPolicy for NewerUpdatePolicy {
    fn should_replace(&self, current: Option<&UpdateRecord>, fetched: &UpdateRecord) -> bool {
        match current {
            None => true,
            Some(current) => fetched.commit_time > current.commit_time,
        }
    }
}
