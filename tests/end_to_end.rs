//! Workspace-level reconciliation test: real [`Orchestrator`] and real
//! [`GlobPathMatcher`] driving the in-memory gateway/store fakes, exercised
//! from outside any single crate the way a release sanity check would.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use vault_sync_core::{PathMatcher, SyncStateStore};
use vault_sync_engine::fakes::{FakeGateway, FakeStore};
use vault_sync_engine::Orchestrator;
use vault_sync_path_matcher::GlobPathMatcher;

fn secret(value: &str) -> vault_sync_core::SecretData {
    let mut data = serde_json::Map::new();
    data.insert("value".to_string(), json!(value));
    data
}

#[tokio::test]
async fn a_full_run_replicates_in_scope_secrets_and_skips_out_of_scope_ones() {
    let gateway = Arc::new(FakeGateway::new(vec!["eu-west", "us-east"]));
    gateway.enable_mount("team-a");
    gateway.enable_mount("team-b");
    gateway.put_main_secret("team-a", "app1/db/password", secret("hunter2"), 1);
    gateway.put_main_secret("team-a", "app1/db/username", secret("admin"), 1);
    gateway.put_main_secret("team-b", "other/secret", secret("irrelevant"), 1);

    let store = Arc::new(FakeStore::new());
    let matcher: Arc<dyn PathMatcher> = Arc::new(
        GlobPathMatcher::new(["team-a".to_string()], ["app1/*".to_string()], Vec::<String>::new())
            .unwrap(),
    );

    let orchestrator = Orchestrator::new(
        gateway.clone(),
        store.clone(),
        matcher,
        vec!["team-a".to_string(), "team-b".to_string()],
        4,
    );

    let summary = orchestrator.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.total, 2, "only team-a/app1/* secrets are in scope");
    assert_eq!(summary.successful, 2);
    assert_eq!(gateway.replica_version("eu-west", "team-a", "app1/db/password"), Some(1));
    assert_eq!(gateway.replica_version("us-east", "team-a", "app1/db/username"), Some(1));
    assert!(gateway.replica_version("eu-west", "team-b", "other/secret").is_none());

    let record = store
        .get("team-a", "app1/db/password", "eu-west")
        .await
        .unwrap()
        .expect("a successful write leaves a sync-state record");
    assert_eq!(record.status, vault_sync_core::SyncStatus::Success);
}

#[tokio::test]
async fn an_unconfigured_mount_produces_no_discovered_secrets() {
    let gateway = Arc::new(FakeGateway::new(vec!["eu-west"]));
    // team-a is never enabled on the main cluster.
    gateway.put_main_secret("team-a", "app1/db", secret("s3cr3t"), 1);

    let store = Arc::new(FakeStore::new());
    let matcher: Arc<dyn PathMatcher> = Arc::new(
        GlobPathMatcher::new(["team-a".to_string()], ["*".to_string()], Vec::<String>::new()).unwrap(),
    );

    let orchestrator = Orchestrator::new(gateway, store, matcher, vec!["team-a".to_string()], 4);
    let summary = orchestrator.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.total, 0);
}
