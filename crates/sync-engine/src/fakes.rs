//! In-memory fakes of [`VaultGateway`] and [`SyncStateStore`] used to drive
//! the orchestrator/job reconciliation algorithm in tests without a live
//! Vault cluster or Postgres instance.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use vault_sync_core::{
    ClusterId, ClusterSyncOutcome, ClusterSyncStatus, GatewayError, ListFilter, SecretData,
    SecretMetadata, SecretPayload, SecretVersionMetadata, StoreError, SyncStateStore,
    SyncedSecretRecord, VaultGateway,
};

#[derive(Default)]
pub struct FakeGateway {
    pub mounts: Mutex<HashSet<String>>,
    pub main: Mutex<HashMap<(String, String), (SecretData, u64)>>,
    pub replica_data: Mutex<HashMap<(String, String, String), (SecretData, u64)>>,
    pub replica_names: Vec<String>,
    pub fail_writes_to: Mutex<HashSet<String>>,
}

impl FakeGateway {
    pub fn new(replica_names: Vec<&str>) -> Self {
        Self {
            replica_names: replica_names.into_iter().map(String::from).collect(),
            ..Default::default()
        }
    }

    pub fn enable_mount(&self, mount: &str) {
        self.mounts.lock().unwrap().insert(mount.to_string());
    }

    pub fn put_main_secret(&self, mount: &str, key_path: &str, data: SecretData, version: u64) {
        self.main
            .lock()
            .unwrap()
            .insert((mount.to_string(), key_path.to_string()), (data, version));
    }

    pub fn delete_main_secret(&self, mount: &str, key_path: &str) {
        self.main
            .lock()
            .unwrap()
            .remove(&(mount.to_string(), key_path.to_string()));
    }

    pub fn fail_writes_to_replica(&self, replica: &str) {
        self.fail_writes_to.lock().unwrap().insert(replica.to_string());
    }

    pub fn replica_version(&self, replica: &str, mount: &str, key_path: &str) -> Option<u64> {
        self.replica_data
            .lock()
            .unwrap()
            .get(&(replica.to_string(), mount.to_string(), key_path.to_string()))
            .map(|(_, v)| *v)
    }
}

/// The ancestor directory prefixes of `key_path` (each ending in `/`, as
/// a real Vault `kv2::list` directory entry would), shallowest first.
/// Mirrors the real gateway's recursive listing so `should_traverse` gets
/// exercised the same way it would against a live cluster.
fn directory_prefixes(key_path: &str) -> Vec<String> {
    let segments: Vec<&str> = key_path.split('/').collect();
    let mut prefixes = Vec::new();
    let mut acc = String::new();
    for segment in &segments[..segments.len().saturating_sub(1)] {
        acc.push_str(segment);
        acc.push('/');
        prefixes.push(acc.clone());
    }
    prefixes
}

fn fake_metadata(version: u64) -> SecretMetadata {
    let now = Utc::now();
    SecretMetadata {
        current_version: version,
        created_time: now,
        updated_time: now,
        versions: vec![SecretVersionMetadata {
            version,
            created_time: now,
            deletion_time: None,
            destroyed: false,
        }],
    }
}

#[async_trait]
impl VaultGateway for FakeGateway {
    async fn check_mounts(
        &self,
        _cluster: &ClusterId,
        mounts: &[String],
        _ct: &CancellationToken,
    ) -> Result<Vec<String>, GatewayError> {
        let enabled = self.mounts.lock().unwrap();
        Ok(mounts.iter().filter(|m| !enabled.contains(*m)).cloned().collect())
    }

    async fn list_keys(
        &self,
        mount: &str,
        filter: &mut dyn ListFilter,
        _ct: &CancellationToken,
    ) -> Result<Vec<String>, GatewayError> {
        let mut keys: Vec<String> = {
            let main = self.main.lock().unwrap();
            main.keys()
                .filter(|(m, _)| m == mount)
                .map(|(_, k)| k.clone())
                .collect()
        };
        keys.sort();

        let mut out = Vec::new();
        for key_path in keys.drain(..) {
            let traversable = directory_prefixes(&key_path)
                .iter()
                .all(|dir| filter(dir, false));
            if traversable && filter(&key_path, true) {
                out.push(key_path);
            }
        }
        Ok(out)
    }

    async fn read_metadata(
        &self,
        mount: &str,
        key_path: &str,
        _ct: &CancellationToken,
    ) -> Result<SecretMetadata, GatewayError> {
        self.main
            .lock()
            .unwrap()
            .get(&(mount.to_string(), key_path.to_string()))
            .map(|(_, v)| fake_metadata(*v))
            .ok_or_else(|| GatewayError::NotFound(format!("{mount}/{key_path}")))
    }

    async fn read_secret(
        &self,
        mount: &str,
        key_path: &str,
        _ct: &CancellationToken,
    ) -> Result<SecretPayload, GatewayError> {
        self.main
            .lock()
            .unwrap()
            .get(&(mount.to_string(), key_path.to_string()))
            .map(|(data, v)| SecretPayload {
                data: data.clone(),
                metadata: fake_metadata(*v),
            })
            .ok_or_else(|| GatewayError::NotFound(format!("{mount}/{key_path}")))
    }

    async fn secret_exists(
        &self,
        cluster: &ClusterId,
        mount: &str,
        key_path: &str,
        _ct: &CancellationToken,
    ) -> Result<bool, GatewayError> {
        let ClusterId::Replica(name) = cluster else {
            return Err(GatewayError::UnknownCluster("main".to_string()));
        };
        Ok(self
            .replica_data
            .lock()
            .unwrap()
            .contains_key(&(name.clone(), mount.to_string(), key_path.to_string())))
    }

    async fn write_secret(
        &self,
        cluster: &ClusterId,
        mount: &str,
        key_path: &str,
        data: SecretData,
        _ct: &CancellationToken,
    ) -> Result<u64, GatewayError> {
        let ClusterId::Replica(name) = cluster else {
            return Err(GatewayError::UnknownCluster("main".to_string()));
        };
        if self.fail_writes_to.lock().unwrap().contains(name) {
            return Err(GatewayError::Request {
                cluster: name.clone(),
                source: Box::new(std::io::Error::other("simulated write failure")),
            });
        }
        let mut replicas = self.replica_data.lock().unwrap();
        let key = (name.clone(), mount.to_string(), key_path.to_string());
        let version = replicas.get(&key).map(|(_, v)| v + 1).unwrap_or(1);
        replicas.insert(key, (data, version));
        Ok(version)
    }

    async fn delete_secret(
        &self,
        cluster: &ClusterId,
        mount: &str,
        key_path: &str,
        _ct: &CancellationToken,
    ) -> Result<(), GatewayError> {
        let ClusterId::Replica(name) = cluster else {
            return Err(GatewayError::UnknownCluster("main".to_string()));
        };
        self.replica_data
            .lock()
            .unwrap()
            .remove(&(name.clone(), mount.to_string(), key_path.to_string()));
        Ok(())
    }

    fn replica_names(&self) -> Vec<String> {
        let mut names = self.replica_names.clone();
        names.sort();
        names
    }

    async fn delete_from_replicas(
        &self,
        mount: &str,
        key_path: &str,
        ct: &CancellationToken,
    ) -> Vec<ClusterSyncStatus> {
        let mut out = Vec::new();
        for name in self.replica_names() {
            let cluster = ClusterId::Replica(name.clone());
            let status = match self.delete_secret(&cluster, mount, key_path, ct).await {
                Ok(()) => ClusterSyncStatus::ok(&name, ClusterSyncOutcome::Deleted),
                Err(e) => ClusterSyncStatus::err(&name, ClusterSyncOutcome::ErrorDeleting, e.to_string()),
            };
            out.push(status);
        }
        out
    }
}

#[derive(Default)]
pub struct FakeStore {
    rows: Mutex<HashMap<(String, String, String), SyncedSecretRecord>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStateStore for FakeStore {
    async fn get(
        &self,
        backend: &str,
        path: &str,
        destination: &str,
    ) -> Result<Option<SyncedSecretRecord>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&(backend.to_string(), path.to_string(), destination.to_string()))
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<SyncedSecretRecord>, StoreError> {
        let mut rows: Vec<SyncedSecretRecord> = self.rows.lock().unwrap().values().cloned().collect();
        rows.sort_by(|a, b| {
            (&a.secret_backend, &a.secret_path, &a.destination_cluster).cmp(&(
                &b.secret_backend,
                &b.secret_path,
                &b.destination_cluster,
            ))
        });
        Ok(rows)
    }

    async fn upsert(&self, record: &SyncedSecretRecord) -> Result<(), StoreError> {
        self.rows.lock().unwrap().insert(
            (
                record.secret_backend.clone(),
                record.secret_path.clone(),
                record.destination_cluster.clone(),
            ),
            record.clone(),
        );
        Ok(())
    }

    async fn delete(&self, backend: &str, path: &str, destination: &str) -> Result<(), StoreError> {
        self.rows
            .lock()
            .unwrap()
            .remove(&(backend.to_string(), path.to_string(), destination.to_string()));
        Ok(())
    }
}
