#![forbid(unsafe_code)]
#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "test utility crate, unwraps and panics are acceptable"
)]

//! Shared test fixtures: an async HTTP test server and an update-server
//! router that serves manifests and content-addressed assets.

mod http_server;
mod update_server;

pub use http_server::TestHttpServer;
pub use update_server::{UpdateServerFixture, asset_sha256_hex};
