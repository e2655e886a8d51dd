//! Sync Job (C4): reconciles one (mount, key_path) against every replica.
//!
//! Rather than writing to every replica unconditionally, a job consults the
//! sync-state store and a per-run existence cache first so that an
//! already-current replica is left untouched and classified as a no-op
//! rather than rewritten.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use vault_sync_core::{
    ClusterId, ClusterSyncOutcome, ClusterSyncStatus, GatewayError, SyncStateStore, SyncStatus,
    SyncedSecretRecord, SyncJobResult, VaultGateway,
};

/// Sentinel [`SyncJobResult::error`] / [`ClusterSyncStatus::error`] message
/// used to mark a job or per-replica step as cut short by cancellation
/// rather than a genuine failure; the orchestrator's `classify` looks for
/// this exact string to route cancelled jobs to `Skipped` instead of
/// `Failed`.
pub const CANCELLED_MARKER: &str = "cancelled";

/// Caches `secret_exists` probes for the lifetime of one orchestrator run,
/// keyed by `(replica, mount, key_path)`, so that reconciling the same
/// secret twice in a run (should not normally happen, but is cheap to
/// guard against) doesn't re-probe every replica.
#[derive(Default)]
pub struct ExistenceCache {
    entries: Mutex<HashMap<(String, String, String), bool>>,
}

impl ExistenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get_or_probe(
        &self,
        gateway: &dyn VaultGateway,
        replica: &str,
        mount: &str,
        key_path: &str,
        ct: &CancellationToken,
    ) -> Result<bool, GatewayError> {
        let key = (replica.to_string(), mount.to_string(), key_path.to_string());
        if let Some(cached) = self.entries.lock().unwrap().get(&key).copied() {
            return Ok(cached);
        }
        let exists = gateway
            .secret_exists(&ClusterId::Replica(replica.to_string()), mount, key_path, ct)
            .await?;
        self.entries.lock().unwrap().insert(key, exists);
        Ok(exists)
    }

    fn invalidate(&self, replica: &str, mount: &str, key_path: &str) {
        self.entries
            .lock()
            .unwrap()
            .remove(&(replica.to_string(), mount.to_string(), key_path.to_string()));
    }
}

/// Runs the reconciliation algorithm for a single secret across every
/// replica known to `gateway`.
#[instrument(skip(gateway, store, cache, ct))]
pub async fn run_sync_job(
    gateway: &dyn VaultGateway,
    store: &dyn SyncStateStore,
    cache: &ExistenceCache,
    mount: &str,
    key_path: &str,
    ct: &CancellationToken,
) -> SyncJobResult {
    if ct.is_cancelled() {
        return SyncJobResult {
            mount: mount.to_string(),
            key_path: key_path.to_string(),
            per_replica: Vec::new(),
            error: Some(CANCELLED_MARKER.to_string()),
        };
    }

    let payload = match gateway.read_secret(mount, key_path, ct).await {
        Ok(payload) => payload,
        Err(e) if e.is_not_found() => {
            return reconcile_deletion(gateway, store, mount, key_path, ct).await;
        }
        Err(e) => {
            warn!(mount, key_path, error = %e, "failed to read secret from main cluster");
            return SyncJobResult {
                mount: mount.to_string(),
                key_path: key_path.to_string(),
                per_replica: Vec::new(),
                error: Some(e.to_string()),
            };
        }
    };

    if !payload.metadata.is_current_live() {
        return reconcile_deletion(gateway, store, mount, key_path, ct).await;
    }

    let current_version = payload.metadata.current_version as i64;
    let mut per_replica = Vec::with_capacity(gateway.replica_names().len());

    for replica in gateway.replica_names() {
        if ct.is_cancelled() {
            per_replica.push(ClusterSyncStatus::err(
                &replica,
                ClusterSyncOutcome::Cancelled,
                CANCELLED_MARKER,
            ));
            continue;
        }

        let status = reconcile_replica(
            gateway,
            store,
            cache,
            mount,
            key_path,
            &replica,
            current_version,
            &payload.data,
            ct,
        )
        .await;
        per_replica.push(status);
    }

    SyncJobResult {
        mount: mount.to_string(),
        key_path: key_path.to_string(),
        per_replica,
        error: None,
    }
}

#[allow(clippy::too_many_arguments)]
async fn reconcile_replica(
    gateway: &dyn VaultGateway,
    store: &dyn SyncStateStore,
    cache: &ExistenceCache,
    mount: &str,
    key_path: &str,
    replica: &str,
    current_version: i64,
    data: &vault_sync_core::SecretData,
    ct: &CancellationToken,
) -> ClusterSyncStatus {
    let existing = store.get(mount, key_path, replica).await.ok().flatten();
    let replica_has_secret = cache
        .get_or_probe(gateway, replica, mount, key_path, ct)
        .await
        .unwrap_or(false);

    let up_to_date = replica_has_secret
        && existing
            .as_ref()
            .map(|r| r.source_version == current_version && r.status == SyncStatus::Success)
            .unwrap_or(false);

    if up_to_date {
        debug!(replica, mount, key_path, "replica already current, skipping write");
        return ClusterSyncStatus::ok(replica, ClusterSyncOutcome::Noop);
    }

    let now = Utc::now();
    let cluster = ClusterId::Replica(replica.to_string());
    match gateway.write_secret(&cluster, mount, key_path, data.clone(), ct).await {
        Ok(version) => {
            cache.invalidate(replica, mount, key_path);
            let record = SyncedSecretRecord {
                secret_backend: mount.to_string(),
                secret_path: key_path.to_string(),
                destination_cluster: replica.to_string(),
                source_version: current_version,
                destination_version: Some(version as i64),
                last_sync_attempt: now,
                last_sync_success: Some(now),
                status: SyncStatus::Success,
                error_message: None,
            };
            if let Err(e) = store.upsert(&record).await {
                warn!(replica, mount, key_path, error = %e, "failed to persist sync-state record");
            }
            ClusterSyncStatus::ok(replica, ClusterSyncOutcome::Updated)
        }
        Err(e) => {
            let record = SyncedSecretRecord {
                secret_backend: mount.to_string(),
                secret_path: key_path.to_string(),
                destination_cluster: replica.to_string(),
                source_version: current_version,
                destination_version: existing.and_then(|r| r.destination_version),
                last_sync_attempt: now,
                last_sync_success: None,
                status: SyncStatus::Failed,
                error_message: Some(e.to_string()),
            };
            if let Err(store_err) = store.upsert(&record).await {
                warn!(replica, mount, key_path, error = %store_err, "failed to persist failed sync-state record");
            }
            ClusterSyncStatus::err(replica, ClusterSyncOutcome::Failed, e.to_string())
        }
    }
}

async fn reconcile_deletion(
    gateway: &dyn VaultGateway,
    store: &dyn SyncStateStore,
    mount: &str,
    key_path: &str,
    ct: &CancellationToken,
) -> SyncJobResult {
    let per_replica = gateway.delete_from_replicas(mount, key_path, ct).await;

    for status in &per_replica {
        if matches!(status.outcome, ClusterSyncOutcome::Deleted) {
            if let Err(e) = store.delete(mount, key_path, &status.destination_cluster).await {
                warn!(
                    mount,
                    key_path,
                    replica = %status.destination_cluster,
                    error = %e,
                    "failed to remove sync-state record after replica deletion"
                );
            }
        }
    }

    SyncJobResult {
        mount: mount.to_string(),
        key_path: key_path.to_string(),
        per_replica,
        error: None,
    }
}
