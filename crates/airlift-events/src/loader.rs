#![forbid(unsafe_code)]

use uuid::Uuid;

/// Events emitted by a remote load cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderEvent {
    /// Per-asset download accounting. Published after every asset completion,
    /// successful or not, so `successful + failed` eventually reaches `total`
    /// unless the cycle aborts first.
    DownloadProgress {
        successful: u32,
        failed: u32,
        total: u32,
    },
    /// An update and all of its assets were committed to the catalog.
    UpdateCommitted { update_id: Uuid },
    /// The load cycle failed before commit.
    LoadFailed { error: String },
}
