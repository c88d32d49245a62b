#![forbid(unsafe_code)]

//! Unified event bus for the airlift update engine.

mod bus;
mod event;
mod loader;
mod state;

pub use bus::EventBus;
pub use event::Event;
pub use loader::LoaderEvent;
pub use state::{LifecycleState, StateEvent};
