#![forbid(unsafe_code)]

use airlift_store::{UpdateId, UpdateRecord};

/// Decides which persisted update should launch.
pub trait LauncherSelectionPolicy: Send + Sync {
    /// Among `candidates`, pick the update to launch for `runtime_version`.
    ///
    /// Returns `None` if no candidate is eligible.
    fn select_update_to_launch(
        &self,
        candidates: &[UpdateRecord],
        runtime_version: &str,
    ) -> Option<UpdateRecord>;
}

/// Default strategy: the newest launchable update matching the runtime
/// version; ties on `commit_time` break toward the highest id.
#[derive(Debug, Default, Clone, Copy)]
pub struct NewestUpdatePolicy;

impl LauncherSelectionPolicy for NewestUpdatePolicy {
    fn select_update_to_launch(
        &self,
        candidates: &[UpdateRecord],
        runtime_version: &str,
    ) -> Option<UpdateRecord> {
        candidates
            .iter()
            .filter(|u| u.is_launchable() && u.runtime_version == runtime_version)
            .max_by_key(|u| (u.commit_time, u.id))
            .cloned()
    }
}

/// Pin to one exact update id, regardless of recency.
///
/// Installed by the controller for fetch-then-launch-exactly-this flows;
/// reverts to the default strategy after the next successful launch.
#[derive(Debug, Clone, Copy)]
pub struct SingleUpdatePolicy {
    id: UpdateId,
}

impl SingleUpdatePolicy {
    #[must_use]
    pub fn new(id: UpdateId) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn id(&self) -> UpdateId {
        self.id
    }
}

impl LauncherSelectionPolicy for SingleUpdatePolicy {
    fn select_update_to_launch(
        &self,
        candidates: &[UpdateRecord],
        _runtime_version: &str,
    ) -> Option<UpdateRecord> {
        candidates
            .iter()
            .find(|u| u.id == self.id && u.is_launchable())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use airlift_store::{AssetHash, UpdateStatus};
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use uuid::Uuid;

    use super::*;

    fn update_at(ts: i64, runtime: &str) -> UpdateRecord {
        UpdateRecord {
            id: UpdateId::from(Uuid::new_v4()),
            commit_time: Utc.timestamp_opt(ts, 0).unwrap(),
            runtime_version: runtime.to_string(),
            manifest: serde_json::json!({}),
            status: UpdateStatus::Committed,
            launch_asset: AssetHash::from_bytes(b"launch"),
        }
    }

    #[test]
    fn newest_wins_among_matching_runtime() {
        let old = update_at(100, "1.0.0");
        let new = update_at(200, "1.0.0");
        let other_runtime = update_at(300, "2.0.0");

        let picked = NewestUpdatePolicy
            .select_update_to_launch(
                &[old.clone(), new.clone(), other_runtime],
                "1.0.0",
            )
            .unwrap();
        assert_eq!(picked.id, new.id);
    }

    #[test]
    fn ties_break_toward_highest_id() {
        let mut a = update_at(100, "1.0.0");
        let mut b = update_at(100, "1.0.0");
        a.id = UpdateId::from(Uuid::from_u128(1));
        b.id = UpdateId::from(Uuid::from_u128(2));

        let picked = NewestUpdatePolicy
            .select_update_to_launch(&[a, b.clone()], "1.0.0")
            .unwrap();
        assert_eq!(picked.id, b.id);
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::wrong_runtime(vec![update_at(100, "9.9.9")])]
    fn no_eligible_candidate_returns_none(#[case] candidates: Vec<UpdateRecord>) {
        assert!(
            NewestUpdatePolicy
                .select_update_to_launch(&candidates, "1.0.0")
                .is_none()
        );
    }

    #[test]
    fn selection_is_deterministic_across_calls() {
        let candidates = vec![update_at(100, "1.0.0"), update_at(200, "1.0.0")];
        let first = NewestUpdatePolicy.select_update_to_launch(&candidates, "1.0.0");
        for _ in 0..10 {
            assert_eq!(
                NewestUpdatePolicy.select_update_to_launch(&candidates, "1.0.0"),
                first
            );
        }
    }

    #[test]
    fn single_update_policy_ignores_recency() {
        let old = update_at(100, "1.0.0");
        let new = update_at(200, "1.0.0");
        let pin = SingleUpdatePolicy::new(old.id);

        let picked = pin
            .select_update_to_launch(&[old.clone(), new], "1.0.0")
            .unwrap();
        assert_eq!(picked.id, old.id);
    }

    #[test]
    fn single_update_policy_misses_absent_id() {
        let pin = SingleUpdatePolicy::new(UpdateId::from(Uuid::new_v4()));
        assert!(
            pin.select_update_to_launch(&[update_at(100, "1.0.0")], "1.0.0")
                .is_none()
        );
    }
}
