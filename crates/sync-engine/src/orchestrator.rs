//! Orchestrator (C5): discovers secrets via the Path Matcher, then reconciles
//! each one with the Sync Job, bounding how many run concurrently.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use vault_sync_core::{
    JobClassification, OrchestratorError, PathMatcher, RunSummary, SyncJobResult, SyncStateStore,
    VaultGateway,
};

use crate::job::{run_sync_job, ExistenceCache, CANCELLED_MARKER};

/// Bounded-concurrency driver over the set of secrets a run should reconcile.
pub struct Orchestrator {
    gateway: Arc<dyn VaultGateway>,
    store: Arc<dyn SyncStateStore>,
    matcher: Arc<dyn PathMatcher>,
    kv_mounts: Vec<String>,
    concurrency: usize,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn VaultGateway>,
        store: Arc<dyn SyncStateStore>,
        matcher: Arc<dyn PathMatcher>,
        kv_mounts: Vec<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            gateway,
            store,
            matcher,
            kv_mounts,
            concurrency: concurrency.max(1),
        }
    }

    /// Enumerates the main cluster's configured mounts and returns every
    /// `(mount, key_path)` pair [`PathMatcher::should_sync`] approves.
    #[instrument(skip(self, ct))]
    async fn discover(&self, ct: &CancellationToken) -> Result<Vec<(String, String)>, OrchestratorError> {
        let missing = self
            .gateway
            .check_mounts(&vault_sync_core::ClusterId::Main, &self.kv_mounts, ct)
            .await
            .map_err(|e| OrchestratorError::Discovery(e.to_string()))?;
        for mount in &missing {
            warn!(mount, "configured kv mount is not enabled on the main cluster, skipping");
        }

        let mut discovered = Vec::new();
        for mount in self.kv_mounts.iter().filter(|m| !missing.contains(m)) {
            let matcher = Arc::clone(&self.matcher);
            let mount_owned = mount.clone();
            let mut filter = move |key_path: &str, is_leaf: bool| -> bool {
                if is_leaf {
                    matcher.should_sync(&mount_owned, key_path)
                } else {
                    matcher.should_traverse(key_path)
                }
            };

            let keys = self
                .gateway
                .list_keys(mount, &mut filter, ct)
                .await
                .map_err(|e| OrchestratorError::Discovery(e.to_string()))?;

            discovered.extend(keys.into_iter().map(|key_path| (mount.clone(), key_path)));
        }

        Ok(discovered)
    }

    /// Runs one full reconciliation pass: discovery, then bounded-concurrency
    /// sync jobs, then summary aggregation (spec-equivalent of a single
    /// invocation; periodic re-invocation is the caller's responsibility).
    #[instrument(skip(self, ct))]
    pub async fn run_once(&self, ct: &CancellationToken) -> Result<RunSummary, OrchestratorError> {
        if ct.is_cancelled() {
            return Err(OrchestratorError::CancelledBeforeStart);
        }

        let started = Instant::now();
        let targets = self.discover(ct).await?;
        info!(count = targets.len(), "discovered secrets to reconcile");

        let cache = ExistenceCache::new();
        let gateway = Arc::clone(&self.gateway);
        let store = Arc::clone(&self.store);

        let results: Vec<SyncJobResult> = stream::iter(targets)
            .map(|(mount, key_path)| {
                let gateway = Arc::clone(&gateway);
                let store = Arc::clone(&store);
                let cache = &cache;
                let ct = ct.clone();
                async move {
                    run_sync_job(gateway.as_ref(), store.as_ref(), cache, &mount, &key_path, &ct).await
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let summary = summarize(results, started.elapsed());

        if ct.is_cancelled() {
            return Err(OrchestratorError::CancelledDuringRun);
        }
        Ok(summary)
    }
}

fn classify(result: &SyncJobResult) -> JobClassification {
    use vault_sync_core::ClusterSyncOutcome;

    if result.error.as_deref() == Some(CANCELLED_MARKER) {
        return JobClassification::Skipped;
    }
    if result.error.is_some() {
        return JobClassification::Failed;
    }
    if result.per_replica.is_empty() {
        return JobClassification::Skipped;
    }
    if result
        .per_replica
        .iter()
        .all(|s| matches!(s.outcome, ClusterSyncOutcome::Cancelled))
    {
        return JobClassification::Skipped;
    }
    if result
        .per_replica
        .iter()
        .any(|s| s.error.is_some() && !matches!(s.outcome, ClusterSyncOutcome::Cancelled))
    {
        return JobClassification::Failed;
    }
    if result
        .per_replica
        .iter()
        .all(|s| matches!(s.outcome, ClusterSyncOutcome::Noop))
    {
        return JobClassification::Noop;
    }
    JobClassification::Successful
}

fn summarize(results: Vec<SyncJobResult>, duration: Duration) -> RunSummary {
    let mut summary = RunSummary::empty(duration);
    summary.total = results.len();
    for result in &results {
        match classify(result) {
            JobClassification::Successful => summary.successful += 1,
            JobClassification::Failed => summary.failed += 1,
            JobClassification::Noop => summary.noop += 1,
            JobClassification::Skipped => summary.skipped += 1,
        }
    }
    summary.results = results;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_sync_core::{ClusterSyncOutcome, ClusterSyncStatus};

    fn result_with(outcomes: Vec<ClusterSyncOutcome>) -> SyncJobResult {
        SyncJobResult {
            mount: "team-a".to_string(),
            key_path: "app1/db".to_string(),
            per_replica: outcomes
                .into_iter()
                .enumerate()
                .map(|(i, o)| ClusterSyncStatus::ok(format!("r{i}"), o))
                .collect(),
            error: None,
        }
    }

    #[test]
    fn all_noop_classifies_as_noop() {
        let r = result_with(vec![ClusterSyncOutcome::Noop, ClusterSyncOutcome::Noop]);
        assert_eq!(classify(&r), JobClassification::Noop);
    }

    #[test]
    fn any_update_classifies_as_successful() {
        let r = result_with(vec![ClusterSyncOutcome::Noop, ClusterSyncOutcome::Updated]);
        assert_eq!(classify(&r), JobClassification::Successful);
    }

    #[test]
    fn top_level_error_classifies_as_failed() {
        let mut r = result_with(vec![]);
        r.error = Some("read failed".to_string());
        assert_eq!(classify(&r), JobClassification::Failed);
    }

    #[test]
    fn empty_per_replica_with_no_error_is_skipped() {
        let r = result_with(vec![]);
        assert_eq!(classify(&r), JobClassification::Skipped);
    }

    #[test]
    fn top_level_cancellation_classifies_as_skipped_not_failed() {
        let mut r = result_with(vec![]);
        r.error = Some(CANCELLED_MARKER.to_string());
        assert_eq!(classify(&r), JobClassification::Skipped);
    }

    #[test]
    fn all_replicas_cancelled_classifies_as_skipped_not_failed() {
        let r = result_with(vec![ClusterSyncOutcome::Cancelled, ClusterSyncOutcome::Cancelled]);
        assert_eq!(classify(&r), JobClassification::Skipped);
    }

    #[tokio::test]
    async fn a_job_run_against_an_already_cancelled_token_classifies_as_skipped() {
        let gateway = crate::fakes::FakeGateway::new(vec!["eu-west"]);
        gateway.enable_mount("team-a");
        gateway.put_main_secret(
            "team-a",
            "app1/db",
            {
                let mut data = serde_json::Map::new();
                data.insert("value".to_string(), serde_json::json!("s3cr3t"));
                data
            },
            1,
        );
        let store = crate::fakes::FakeStore::new();

        let ct = CancellationToken::new();
        ct.cancel();
        let result = run_sync_job(&gateway, &store, &ExistenceCache::new(), "team-a", "app1/db", &ct).await;

        assert_eq!(result.error.as_deref(), Some(CANCELLED_MARKER));
        assert_eq!(classify(&result), JobClassification::Skipped);
    }
}
