#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Controller lifecycle state.
///
/// Session-scoped; never persisted. Updates and assets carry no lifecycle
/// state of their own beyond their commit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// No cycle in flight.
    Idle,
    /// Fetching and parsing the remote update response.
    Checking,
    /// Downloading manifest assets.
    Downloading,
    /// A launchable update is resolved and ready.
    Ready,
    /// The selected update could not be launched.
    LaunchFailed,
    /// The host was asked to reload with the currently selected update.
    Restarting,
}

/// Lifecycle transition event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateEvent {
    pub state: LifecycleState,
}

impl From<LifecycleState> for StateEvent {
    fn from(state: LifecycleState) -> Self {
        Self { state }
    }
}
