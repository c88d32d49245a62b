//! Axum router fixture that plays the role of a remote update server.
//!
//! Serves a configurable update response at `/manifest` and
//! content-addressed asset bytes at `/assets/:name`. Individual assets can
//! be configured to fail with a status code or to hang, for abort and
//! cancellation tests.

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use sha2::{Digest, Sha256};

/// Hex SHA-256 of `bytes`, as declared in manifest asset descriptors.
#[must_use]
pub fn asset_sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

enum AssetBehavior {
    Bytes(Vec<u8>),
    Status(u16),
    Hang,
}

struct FixtureState {
    manifest: RwLock<serde_json::Value>,
    assets: RwLock<HashMap<String, AssetBehavior>>,
    manifest_hits: AtomicU32,
    asset_hits: AtomicU32,
}

/// Remote update server fixture.
#[derive(Clone)]
pub struct UpdateServerFixture {
    state: Arc<FixtureState>,
}

impl Default for UpdateServerFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateServerFixture {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(FixtureState {
                manifest: RwLock::new(serde_json::json!({ "directive": "noUpdateAvailable" })),
                assets: RwLock::new(HashMap::new()),
                manifest_hits: AtomicU32::new(0),
                asset_hits: AtomicU32::new(0),
            }),
        }
    }

    /// Replace the body served at `/manifest`.
    pub fn set_manifest(&self, body: serde_json::Value) {
        *self.state.manifest.write().unwrap() = body;
    }

    /// Serve `bytes` at `/assets/<name>`.
    pub fn add_asset(&self, name: &str, bytes: Vec<u8>) {
        self.state
            .assets
            .write()
            .unwrap()
            .insert(name.to_string(), AssetBehavior::Bytes(bytes));
    }

    /// Serve `status` at `/assets/<name>`.
    pub fn add_failing_asset(&self, name: &str, status: u16) {
        self.state
            .assets
            .write()
            .unwrap()
            .insert(name.to_string(), AssetBehavior::Status(status));
    }

    /// Never complete requests for `/assets/<name>`.
    pub fn add_hanging_asset(&self, name: &str) {
        self.state
            .assets
            .write()
            .unwrap()
            .insert(name.to_string(), AssetBehavior::Hang);
    }

    #[must_use]
    pub fn manifest_hits(&self) -> u32 {
        self.state.manifest_hits.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn asset_hits(&self) -> u32 {
        self.state.asset_hits.load(Ordering::SeqCst)
    }

    /// Build the axum router for this fixture.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/manifest", get(serve_manifest))
            .route("/assets/:name", get(serve_asset))
            .with_state(self.state.clone())
    }
}

async fn serve_manifest(State(state): State<Arc<FixtureState>>) -> Response {
    state.manifest_hits.fetch_add(1, Ordering::SeqCst);
    let body = state.manifest.read().unwrap().clone();
    Json(body).into_response()
}

async fn serve_asset(
    State(state): State<Arc<FixtureState>>,
    Path(name): Path<String>,
) -> Response {
    state.asset_hits.fetch_add(1, Ordering::SeqCst);
    let hang = {
        let assets = state.assets.read().unwrap();
        match assets.get(&name) {
            Some(AssetBehavior::Bytes(bytes)) => return bytes.clone().into_response(),
            Some(AssetBehavior::Status(code)) => {
                let status =
                    StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                return status.into_response();
            }
            Some(AssetBehavior::Hang) => true,
            None => return StatusCode::NOT_FOUND.into_response(),
        }
    };
    debug_assert!(hang);
    // Park the request far past any test timeout.
    tokio::time::sleep(Duration::from_secs(3600)).await;
    StatusCode::GATEWAY_TIMEOUT.into_response()
}
