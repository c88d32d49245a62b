//! End-to-end update cycles against a live HTTP fixture: fetch, commit,
//! launch, reclamation, directives, and failure atomicity.

use std::{sync::Arc, time::Duration};

use airlift::{
    Event, EventBus, FetchOutcome, LaunchError, LifecycleState, LoaderError, LoaderEvent,
    RemoteLoader, UpdatesConfig, UpdatesController,
    net::HttpClient,
    store::{Catalog, MemCatalog, UpdateId},
};
use airlift_test_utils::{TestHttpServer, UpdateServerFixture, asset_sha256_hex};
use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const U1_ID: &str = "11111111-1111-4111-8111-111111111111";
const U2_ID: &str = "22222222-2222-4222-8222-222222222222";

#[fixture]
fn temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}

async fn update_server() -> (UpdateServerFixture, TestHttpServer) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let fixture = UpdateServerFixture::new();
    let server = TestHttpServer::new(fixture.router()).await;
    (fixture, server)
}

fn config_for(server: &TestHttpServer) -> UpdatesConfig {
    UpdatesConfig::new(server.url("/manifest").as_str(), "1.0.0").unwrap()
}

fn asset_descriptor(server: &TestHttpServer, name: &str, bytes: &[u8], kind: &str) -> serde_json::Value {
    serde_json::json!({
        "hash": asset_sha256_hex(bytes),
        "url": server.url(&format!("/assets/{name}")),
        "kind": kind,
    })
}

fn manifest_json(
    server: &TestHttpServer,
    id: &str,
    created_at: &str,
    launch: (&str, &[u8]),
    extra: &[(&str, &[u8])],
) -> serde_json::Value {
    let assets: Vec<serde_json::Value> = extra
        .iter()
        .map(|(name, bytes)| asset_descriptor(server, name, bytes, "image"))
        .collect();
    serde_json::json!({
        "manifest": {
            "id": id,
            "createdAt": created_at,
            "runtimeVersion": "1.0.0",
            "launchAsset": asset_descriptor(server, launch.0, launch.1, "bundle"),
            "assets": assets,
        }
    })
}

fn controller_for(
    server: &TestHttpServer,
    dir: &std::path::Path,
    catalog: Arc<MemCatalog>,
) -> UpdatesController {
    UpdatesController::builder(config_for(server), dir)
        .with_catalog(catalog)
        .build()
        .unwrap()
}

async fn wait_for_reap_of(catalog: &MemCatalog, id: UpdateId) {
    for _ in 0..150 {
        if catalog.update(id).await.unwrap().is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("update {id} was not reaped in time");
}

#[rstest]
#[tokio::test]
async fn fetch_newer_update_then_reap_keeps_shared_assets(temp_dir: tempfile::TempDir) {
    let (fixture, server) = update_server().await;
    let catalog = Arc::new(MemCatalog::new());
    let controller = controller_for(&server, temp_dir.path(), catalog.clone());

    let bundle1 = b"bundle one".as_slice();
    let bundle2 = b"bundle two".as_slice();
    let shared = b"shared image".as_slice();
    fixture.add_asset("bundle1", bundle1.to_vec());
    fixture.add_asset("bundle2", bundle2.to_vec());
    fixture.add_asset("shared", shared.to_vec());

    fixture.set_manifest(manifest_json(
        &server,
        U1_ID,
        "2026-03-01T10:00:00Z",
        ("bundle1", bundle1),
        &[("shared", shared)],
    ));
    let FetchOutcome::Launched(first) = controller.fetch_update().await.unwrap() else {
        panic!("expected first launch");
    };
    assert_eq!(first.update.id, UpdateId::from(Uuid::parse_str(U1_ID).unwrap()));

    fixture.set_manifest(manifest_json(
        &server,
        U2_ID,
        "2026-03-02T10:00:00Z",
        ("bundle2", bundle2),
        &[("shared", shared)],
    ));
    let FetchOutcome::Launched(second) = controller.fetch_update().await.unwrap() else {
        panic!("expected second launch");
    };
    let u2 = UpdateId::from(Uuid::parse_str(U2_ID).unwrap());
    assert_eq!(second.update.id, u2);

    // The background reap deletes the superseded update and its exclusive
    // asset; the shared asset survives.
    wait_for_reap_of(&catalog, first.update.id).await;
    assert!(catalog.update(u2).await.unwrap().is_some());

    let remaining = catalog.list_assets().await.unwrap();
    let shared_hash = asset_sha256_hex(shared);
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().any(|a| a.hash.to_hex() == shared_hash));
    assert!(remaining.iter().all(|a| {
        let rel = a.relative_path.as_deref().unwrap();
        temp_dir.path().join(rel).exists()
    }));
    assert!(
        !temp_dir
            .path()
            .join(format!("assets/{}", asset_sha256_hex(bundle1)))
            .exists()
    );
}

#[rstest]
#[tokio::test]
async fn one_failing_asset_aborts_the_whole_load(temp_dir: tempfile::TempDir) {
    let (fixture, server) = update_server().await;
    let catalog = Arc::new(MemCatalog::new());
    let controller = controller_for(&server, temp_dir.path(), catalog.clone());

    let bundle = b"bundle".as_slice();
    let broken = b"broken image".as_slice();
    fixture.add_asset("bundle", bundle.to_vec());
    fixture.add_failing_asset("broken", 404);
    fixture.set_manifest(manifest_json(
        &server,
        U1_ID,
        "2026-03-01T10:00:00Z",
        ("bundle", bundle),
        &[("broken", broken)],
    ));

    let err = controller.fetch_update().await.unwrap_err();
    assert!(matches!(err, airlift::UpdatesError::Loader(_)));

    // All or nothing: no update row, no asset rows.
    assert!(catalog.list_updates().await.unwrap().is_empty());
    assert!(catalog.list_assets().await.unwrap().is_empty());
    assert_eq!(controller.state(), LifecycleState::Idle);
}

#[rstest]
#[tokio::test]
async fn corrupted_asset_bytes_fail_hash_verification(temp_dir: tempfile::TempDir) {
    let (fixture, server) = update_server().await;
    let catalog = Arc::new(MemCatalog::new());
    let controller = controller_for(&server, temp_dir.path(), catalog.clone());

    let declared = b"declared bytes".as_slice();
    fixture.add_asset("bundle", b"tampered bytes".to_vec());
    fixture.set_manifest(manifest_json(
        &server,
        U1_ID,
        "2026-03-01T10:00:00Z",
        ("bundle", declared),
        &[],
    ));

    let err = controller.fetch_update().await.unwrap_err();
    assert!(matches!(
        err,
        airlift::UpdatesError::Loader(LoaderError::HashMismatch { .. })
    ));
    assert!(catalog.list_updates().await.unwrap().is_empty());
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn cancel_mid_download_leaves_catalog_untouched(temp_dir: tempfile::TempDir) {
    let (fixture, server) = update_server().await;
    let catalog = Arc::new(MemCatalog::new());

    let bundle = b"bundle".as_slice();
    fixture.add_hanging_asset("bundle");
    fixture.set_manifest(manifest_json(
        &server,
        U1_ID,
        "2026-03-01T10:00:00Z",
        ("bundle", bundle),
        &[],
    ));

    let cancel = CancellationToken::new();
    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let loader = RemoteLoader::new(
        Arc::new(HttpClient::default()),
        catalog.clone(),
        config_for(&server),
        temp_dir.path(),
        bus,
        cancel.clone(),
    );
    let load = tokio::spawn(async move { loader.load(|_| true).await });

    // Cancel once the asset request is parked on the server.
    while fixture.asset_hits() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();

    let result = load.await.unwrap();
    assert!(matches!(result, Err(LoaderError::Cancelled)));
    assert!(catalog.list_updates().await.unwrap().is_empty());
    assert!(catalog.list_assets().await.unwrap().is_empty());

    // A caller-initiated cancel is reported through the result only, never
    // as a failure event.
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, Event::Loader(LoaderEvent::LoadFailed { .. })),
            "cancel must not surface as a load failure"
        );
    }
}

#[rstest]
#[tokio::test]
async fn unresolvable_launch_asset_sets_launch_failed(temp_dir: tempfile::TempDir) {
    let (fixture, server) = update_server().await;
    let catalog = Arc::new(MemCatalog::new());
    let controller = controller_for(&server, temp_dir.path(), catalog.clone());

    // The launch asset claims a bundled copy, but no embedded assets are
    // registered with the controller: the commit succeeds and the launch
    // cannot resolve.
    let bundle = b"bundle".as_slice();
    let mut descriptor = asset_descriptor(&server, "bundle", bundle, "bundle");
    descriptor["embedded"] = serde_json::json!(true);
    fixture.set_manifest(serde_json::json!({
        "manifest": {
            "id": U1_ID,
            "createdAt": "2026-03-01T10:00:00Z",
            "runtimeVersion": "1.0.0",
            "launchAsset": descriptor,
            "assets": [],
        }
    }));

    let err = controller.fetch_update().await.unwrap_err();
    assert!(matches!(
        err,
        airlift::UpdatesError::Launch(LaunchError::IncompleteBundle { .. })
    ));
    assert_eq!(controller.state(), LifecycleState::LaunchFailed);

    // The commit itself stands; only the launch failed.
    assert_eq!(catalog.list_updates().await.unwrap().len(), 1);
}

#[rstest]
#[tokio::test]
async fn rollback_directive_changes_nothing_locally(temp_dir: tempfile::TempDir) {
    let (fixture, server) = update_server().await;
    let catalog = Arc::new(MemCatalog::new());
    let controller = controller_for(&server, temp_dir.path(), catalog.clone());

    fixture.set_manifest(serde_json::json!({ "directive": "rollBackToEmbedded" }));

    let outcome = controller.fetch_update().await.unwrap();
    assert!(matches!(outcome, FetchOutcome::RollBackToEmbedded));
    assert!(catalog.list_updates().await.unwrap().is_empty());
    assert_eq!(controller.state(), LifecycleState::Idle);
}

#[rstest]
#[tokio::test]
async fn configuration_pin_reverts_after_next_successful_launch(temp_dir: tempfile::TempDir) {
    let (fixture, server) = update_server().await;
    let catalog = Arc::new(MemCatalog::new());
    let controller = controller_for(&server, temp_dir.path(), catalog.clone());

    let bundle1 = b"bundle one".as_slice();
    let bundle2 = b"bundle two".as_slice();
    fixture.add_asset("bundle1", bundle1.to_vec());
    fixture.add_asset("bundle2", bundle2.to_vec());

    // Override fetch pins exactly the update it loaded.
    fixture.set_manifest(manifest_json(
        &server,
        U1_ID,
        "2026-03-01T10:00:00Z",
        ("bundle1", bundle1),
        &[],
    ));
    let FetchOutcome::Launched(pinned) = controller
        .fetch_update_with_configuration(config_for(&server), |_| true)
        .await
        .unwrap()
    else {
        panic!("expected pinned launch");
    };
    let u1 = UpdateId::from(Uuid::parse_str(U1_ID).unwrap());
    assert_eq!(pinned.update.id, u1);

    // A newer update is committed, but the pin still selects the pinned one
    // for this launch.
    fixture.set_manifest(manifest_json(
        &server,
        U2_ID,
        "2026-03-02T10:00:00Z",
        ("bundle2", bundle2),
        &[],
    ));
    let FetchOutcome::Launched(still_pinned) = controller.fetch_update().await.unwrap() else {
        panic!("expected launch under pin");
    };
    assert_eq!(still_pinned.update.id, u1);

    // The pin is spent; the default policy takes over again.
    let FetchOutcome::Launched(newest) = controller.fetch_update().await.unwrap() else {
        panic!("expected launch under default policy");
    };
    assert_eq!(newest.update.id, UpdateId::from(Uuid::parse_str(U2_ID).unwrap()));
}

#[rstest]
#[tokio::test]
async fn progress_and_lifecycle_events_reach_subscribers(temp_dir: tempfile::TempDir) {
    let (fixture, server) = update_server().await;
    let catalog = Arc::new(MemCatalog::new());
    let controller = controller_for(&server, temp_dir.path(), catalog);
    let mut events = controller.subscribe();

    let bundle = b"bundle".as_slice();
    let image = b"image".as_slice();
    fixture.add_asset("bundle", bundle.to_vec());
    fixture.add_asset("image", image.to_vec());
    fixture.set_manifest(manifest_json(
        &server,
        U1_ID,
        "2026-03-01T10:00:00Z",
        ("bundle", bundle),
        &[("image", image)],
    ));

    controller.fetch_update().await.unwrap();

    let mut saw_progress_total = None;
    let mut saw_committed = false;
    let mut lifecycle = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            Event::Loader(LoaderEvent::DownloadProgress { total, failed, .. }) => {
                assert_eq!(failed, 0);
                saw_progress_total = Some(total);
            }
            Event::Loader(LoaderEvent::UpdateCommitted { .. }) => saw_committed = true,
            Event::Loader(LoaderEvent::LoadFailed { .. }) => panic!("unexpected failure event"),
            Event::State(state) => lifecycle.push(state.state),
        }
    }

    assert_eq!(saw_progress_total, Some(2));
    assert!(saw_committed);
    assert_eq!(
        lifecycle,
        vec![
            LifecycleState::Checking,
            LifecycleState::Downloading,
            LifecycleState::Ready,
        ]
    );
}

#[rstest]
#[tokio::test]
async fn check_reports_without_downloading(temp_dir: tempfile::TempDir) {
    let (fixture, server) = update_server().await;
    let catalog = Arc::new(MemCatalog::new());
    let controller = controller_for(&server, temp_dir.path(), catalog.clone());

    let bundle = b"bundle".as_slice();
    fixture.set_manifest(manifest_json(
        &server,
        U1_ID,
        "2026-03-01T10:00:00Z",
        ("bundle", bundle),
        &[],
    ));

    let result = controller.check_for_update().await.unwrap();
    assert!(matches!(result, airlift::CheckResult::UpdateAvailable(_)));
    assert_eq!(fixture.asset_hits(), 0);
    assert!(catalog.list_updates().await.unwrap().is_empty());
}
