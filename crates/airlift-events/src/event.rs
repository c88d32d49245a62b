#![forbid(unsafe_code)]

use crate::{LoaderEvent, StateEvent};

/// Unified event for the full update pipeline.
///
/// Hierarchical: each subsystem has its own variant with a sub-enum.
#[derive(Clone, Debug)]
pub enum Event {
    /// Loader (fetch/download) event.
    Loader(LoaderEvent),
    /// Controller lifecycle event.
    State(StateEvent),
}

impl From<LoaderEvent> for Event {
    fn from(e: LoaderEvent) -> Self {
        Self::Loader(e)
    }
}

impl From<StateEvent> for Event {
    fn from(e: StateEvent) -> Self {
        Self::State(e)
    }
}
