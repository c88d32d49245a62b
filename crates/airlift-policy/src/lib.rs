#![forbid(unsafe_code)]

//! # airlift-policy
//!
//! Pure selection policies: which update to launch, whether a freshly
//! fetched manifest should replace the current selection, and which updates
//! the reaper must retain.
//!
//! ## Normative
//! - Policies are pure and deterministic: no I/O, no clocks, no hidden
//!   state. The same inputs always produce the same decision.
//! - Policies never fail; they are total over their inputs.
//! - The three concerns are independently swappable and combined into one
//!   [`SelectionPolicy`] value. Swapping a member produces a new value;
//!   in-flight cycles keep the snapshot they started with.

mod launcher;
mod loader;
mod reaper;
mod triple;

pub use launcher::{LauncherSelectionPolicy, NewestUpdatePolicy, SingleUpdatePolicy};
pub use loader::{LoaderSelectionPolicy, NewerUpdatePolicy};
pub use reaper::{ReaperSelectionPolicy, RetainLaunchedAndNextPolicy};
pub use triple::SelectionPolicy;
