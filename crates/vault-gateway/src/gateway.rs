//! [`VaultSyncGateway`]: the production [`VaultGateway`] implementation,
//! fanning a single main-cluster read out to every configured replica.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use vaultrs::api::kv2::responses::{ReadSecretMetadataResponse, SecretVersionMetadata as VaultVersionMeta};
use vaultrs::client::VaultClient;
use vaultrs::kv2;

use vault_sync_core::{
    ClusterId, ClusterSyncOutcome, ClusterSyncStatus, GatewayError, ListFilter, SecretData,
    SecretMetadata, SecretPayload, SecretVersionMetadata, VaultGateway,
};

use crate::error::{is_not_found, map_request_error};
use crate::session::{is_auth_expired, ClusterEndpoint, ClusterSession};

/// Cluster-agnostic Vault API, backed by one authenticated session per
/// cluster (one main, N replicas).
pub struct VaultSyncGateway {
    main: ClusterSession,
    replicas: HashMap<String, ClusterSession>,
    replica_order: Vec<String>,
    fan_out_limit: usize,
}

impl VaultSyncGateway {
    /// `fan_out_limit` is always the replica count: every replica write for
    /// one secret runs concurrently, independent of how many secrets the
    /// orchestrator reconciles at once (that bound lives on the orchestrator,
    /// not here).
    pub fn new(main: ClusterEndpoint, replicas: Vec<ClusterEndpoint>) -> Self {
        let mut replica_order: Vec<String> = replicas.iter().map(|r| r.name.clone()).collect();
        replica_order.sort();
        let fan_out_limit = replica_order.len().max(1);

        let replica_sessions = replicas
            .into_iter()
            .map(|r| (r.name.clone(), ClusterSession::new(r)))
            .collect();

        Self {
            main: ClusterSession::new(main),
            replicas: replica_sessions,
            replica_order,
            fan_out_limit,
        }
    }

    pub(crate) fn session_for(&self, cluster: &ClusterId) -> Result<&ClusterSession, GatewayError> {
        match cluster {
            ClusterId::Main => Ok(&self.main),
            ClusterId::Replica(name) => self
                .replicas
                .get(name)
                .ok_or_else(|| GatewayError::UnknownCluster(name.clone())),
        }
    }

    /// Runs `op` against `session`'s client, transparently re-authenticating
    /// and retrying once if the failure looks like an expired token.
    async fn with_client<F, Fut, T>(&self, session: &ClusterSession, op: F) -> Result<T, GatewayError>
    where
        F: Fn(std::sync::Arc<VaultClient>) -> Fut,
        Fut: Future<Output = Result<T, vaultrs::error::ClientError>>,
    {
        let client = session.client().await?;
        match op(client).await {
            Ok(v) => Ok(v),
            Err(e) if is_auth_expired(&e) => {
                let client = session.reauthenticate().await?;
                op(client)
                    .await
                    .map_err(|e| map_request_error(session.name(), "retry after reauth", e))
            }
            Err(e) => Err(map_request_error(session.name(), "vault request", e)),
        }
    }

    fn parse_metadata(resp: ReadSecretMetadataResponse) -> SecretMetadata {
        let mut versions: Vec<SecretVersionMetadata> = resp
            .versions
            .into_iter()
            .filter_map(|(version_str, meta)| {
                version_str.parse::<u64>().ok().map(|version| {
                    let created_time = meta
                        .created_time
                        .parse::<DateTime<Utc>>()
                        .unwrap_or_else(|_| Utc::now());
                    let deletion_time = parse_optional_time(&meta.deletion_time);
                    SecretVersionMetadata {
                        version,
                        created_time,
                        deletion_time,
                        destroyed: meta.destroyed,
                    }
                })
            })
            .collect();
        versions.sort_by_key(|v| v.version);

        SecretMetadata {
            current_version: resp.current_version,
            created_time: resp
                .created_time
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
            updated_time: resp
                .updated_time
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
            versions,
        }
    }

    /// Recursive enumeration of one subtree; `prefix` is the key_path
    /// segment already traversed from `mount`'s root.
    fn list_recursive<'a>(
        &'a self,
        mount: &'a str,
        prefix: String,
        filter: &'a mut dyn ListFilter,
        ct: &'a CancellationToken,
        out: &'a mut Vec<String>,
    ) -> Pin<Box<dyn Future<Output = Result<(), GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            if ct.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }

            let entries = {
                let client = self.main.client().await?;
                kv2::list(client.as_ref(), mount, &prefix).await
            };

            let entries = match entries {
                Ok(entries) => entries,
                Err(e) if is_not_found(&e) => return Ok(()),
                Err(e) => return Err(map_request_error(self.main.name(), "list", e)),
            };

            for entry in entries {
                if ct.is_cancelled() {
                    return Err(GatewayError::Cancelled);
                }

                let is_leaf = !entry.ends_with('/');
                let child_path = format!("{prefix}{entry}");

                if is_leaf {
                    if filter(&child_path, true) {
                        out.push(child_path);
                    }
                } else if filter(&child_path, false) {
                    self.list_recursive(mount, child_path, filter, ct, out).await?;
                }
            }

            Ok(())
        })
    }
}

fn parse_optional_time(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        None
    } else {
        raw.parse::<DateTime<Utc>>().ok()
    }
}

#[async_trait]
impl VaultGateway for VaultSyncGateway {
    #[instrument(skip(self, ct))]
    async fn check_mounts(
        &self,
        cluster: &ClusterId,
        mounts: &[String],
        ct: &CancellationToken,
    ) -> Result<Vec<String>, GatewayError> {
        if ct.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }
        let session = self.session_for(cluster)?;
        let client = session.client().await?;
        let enabled = vaultrs::sys::mount::list(client.as_ref())
            .await
            .map_err(|e| map_request_error(session.name(), "list mounts", e))?;

        let missing = mounts
            .iter()
            .filter(|m| !enabled.contains_key(&format!("{m}/")))
            .cloned()
            .collect();
        Ok(missing)
    }

    #[instrument(skip(self, filter, ct))]
    async fn list_keys(
        &self,
        mount: &str,
        filter: &mut dyn ListFilter,
        ct: &CancellationToken,
    ) -> Result<Vec<String>, GatewayError> {
        let mut out = Vec::new();
        self.list_recursive(mount, String::new(), filter, ct, &mut out)
            .await?;
        Ok(out)
    }

    #[instrument(skip(self, ct))]
    async fn read_metadata(
        &self,
        mount: &str,
        key_path: &str,
        ct: &CancellationToken,
    ) -> Result<SecretMetadata, GatewayError> {
        if ct.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }
        let resp: ReadSecretMetadataResponse = self
            .with_client(&self.main, |client| {
                let mount = mount.to_string();
                let key_path = key_path.to_string();
                async move { kv2::read_metadata(client.as_ref(), &mount, &key_path).await }
            })
            .await
            .map_err(|e| remap_not_found(e, mount, key_path))?;

        Ok(Self::parse_metadata(resp))
    }

    #[instrument(skip(self, ct))]
    async fn read_secret(
        &self,
        mount: &str,
        key_path: &str,
        ct: &CancellationToken,
    ) -> Result<SecretPayload, GatewayError> {
        if ct.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }
        let data: SecretData = self
            .with_client(&self.main, |client| {
                let mount = mount.to_string();
                let key_path = key_path.to_string();
                async move {
                    kv2::read::<SecretData>(client.as_ref(), &mount, &key_path).await
                }
            })
            .await
            .map_err(|e| remap_not_found(e, mount, key_path))?;

        let metadata = self.read_metadata(mount, key_path, ct).await?;
        Ok(SecretPayload { data, metadata })
    }

    #[instrument(skip(self, ct))]
    async fn secret_exists(
        &self,
        cluster: &ClusterId,
        mount: &str,
        key_path: &str,
        ct: &CancellationToken,
    ) -> Result<bool, GatewayError> {
        if ct.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }
        let session = self.session_for(cluster)?;
        let result = self
            .with_client(session, |client| {
                let mount = mount.to_string();
                let key_path = key_path.to_string();
                async move { kv2::read_metadata(client.as_ref(), &mount, &key_path).await }
            })
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, data, ct))]
    async fn write_secret(
        &self,
        cluster: &ClusterId,
        mount: &str,
        key_path: &str,
        data: SecretData,
        ct: &CancellationToken,
    ) -> Result<u64, GatewayError> {
        if ct.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }
        let session = self.session_for(cluster)?;
        let resp: VaultVersionMeta = self
            .with_client(session, |client| {
                let mount = mount.to_string();
                let key_path = key_path.to_string();
                let data = data.clone();
                async move { kv2::set(client.as_ref(), &mount, &key_path, &data).await }
            })
            .await?;
        Ok(resp.version)
    }

    #[instrument(skip(self, ct))]
    async fn delete_secret(
        &self,
        cluster: &ClusterId,
        mount: &str,
        key_path: &str,
        ct: &CancellationToken,
    ) -> Result<(), GatewayError> {
        if ct.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }
        let session = self.session_for(cluster)?;
        let result = self
            .with_client(session, |client| {
                let mount = mount.to_string();
                let key_path = key_path.to_string();
                async move { kv2::delete_metadata(client.as_ref(), &mount, &key_path).await }
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn replica_names(&self) -> Vec<String> {
        self.replica_order.clone()
    }

    #[instrument(skip(self, ct))]
    async fn delete_from_replicas(
        &self,
        mount: &str,
        key_path: &str,
        ct: &CancellationToken,
    ) -> Vec<ClusterSyncStatus> {
        let (tx, rx) = async_channel::bounded::<String>(self.fan_out_limit.max(1));
        for name in &self.replica_order {
            tx.send(name.clone()).await.ok();
        }
        tx.close();

        let mut handles = Vec::with_capacity(self.replica_order.len());
        for _ in 0..self.replica_order.len().min(self.fan_out_limit.max(1)) {
            let rx = rx.clone();
            handles.push(self.run_deleter(rx, mount.to_string(), key_path.to_string(), ct.clone()));
        }

        let mut statuses: Vec<ClusterSyncStatus> =
            futures::future::join_all(handles).await.into_iter().flatten().collect();
        statuses.sort_by(|a, b| a.destination_cluster.cmp(&b.destination_cluster));
        statuses
    }
}

impl VaultSyncGateway {
    async fn run_deleter(
        &self,
        rx: async_channel::Receiver<String>,
        mount: String,
        key_path: String,
        ct: CancellationToken,
    ) -> Vec<ClusterSyncStatus> {
        let mut out = Vec::new();
        while let Ok(name) = rx.recv().await {
            let cluster = ClusterId::Replica(name.clone());
            let status = match self.delete_secret(&cluster, &mount, &key_path, &ct).await {
                Ok(()) => ClusterSyncStatus::ok(&name, ClusterSyncOutcome::Deleted),
                Err(e) => {
                    debug!(replica = %name, error = %e, "replica delete failed");
                    ClusterSyncStatus::err(&name, ClusterSyncOutcome::ErrorDeleting, e.to_string())
                }
            };
            out.push(status);
        }
        out
    }
}

fn remap_not_found(err: GatewayError, mount: &str, key_path: &str) -> GatewayError {
    if err.is_not_found() {
        GatewayError::NotFound(format!("{mount}/{key_path}"))
    } else {
        err
    }
}
