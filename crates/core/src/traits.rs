//! Behavior-interface traits: the three dynamic-dispatch points named in
//! spec §9 (sync, fan-out, discovery) so the Orchestrator and Sync Job can
//! be exercised against in-memory fakes instead of a live Vault/Postgres.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{GatewayError, StoreError};
use crate::types::{
    ClusterId, ClusterSyncStatus, SecretData, SecretMetadata, SecretPayload, SyncedSecretRecord,
};

/// Callback consulted by [`VaultGateway::list_keys`] at every tree node.
///
/// Returning `false` at an interior node (`is_leaf == false`) prunes that
/// subtree; returning `false` at a leaf omits it. See spec §4.1 "List
/// algorithm" and §4.3 `should_traverse`.
pub trait ListFilter: FnMut(&str, bool) -> bool + Send {}
impl<F> ListFilter for F where F: FnMut(&str, bool) -> bool + Send {}

/// Cluster-agnostic API over one main cluster plus N named replicas (C1).
#[async_trait]
pub trait VaultGateway: Send + Sync {
    /// Returns the subset of `mounts` not enabled as secret engines on `cluster`.
    async fn check_mounts(
        &self,
        cluster: &ClusterId,
        mounts: &[String],
        ct: &CancellationToken,
    ) -> Result<Vec<String>, GatewayError>;

    /// Recursive enumeration of the versioned-KV tree at `mount` on the main cluster.
    async fn list_keys(
        &self,
        mount: &str,
        filter: &mut dyn ListFilter,
        ct: &CancellationToken,
    ) -> Result<Vec<String>, GatewayError>;

    /// Fails with [`GatewayError::NotFound`] when the secret never existed.
    async fn read_metadata(
        &self,
        mount: &str,
        key_path: &str,
        ct: &CancellationToken,
    ) -> Result<SecretMetadata, GatewayError>;

    /// Reads the current version only.
    async fn read_secret(
        &self,
        mount: &str,
        key_path: &str,
        ct: &CancellationToken,
    ) -> Result<SecretPayload, GatewayError>;

    /// Metadata probe; `NotFound` maps to `Ok(false)`, other errors propagate.
    async fn secret_exists(
        &self,
        cluster: &ClusterId,
        mount: &str,
        key_path: &str,
        ct: &CancellationToken,
    ) -> Result<bool, GatewayError>;

    /// Upsert; returns the version Vault assigned.
    async fn write_secret(
        &self,
        cluster: &ClusterId,
        mount: &str,
        key_path: &str,
        data: SecretData,
        ct: &CancellationToken,
    ) -> Result<u64, GatewayError>;

    /// Soft-delete of current version plus metadata removal. `NotFound` is success.
    async fn delete_secret(
        &self,
        cluster: &ClusterId,
        mount: &str,
        key_path: &str,
        ct: &CancellationToken,
    ) -> Result<(), GatewayError>;

    /// Stable, sorted replica names.
    fn replica_names(&self) -> Vec<String>;

    /// Concurrent deletion across replicas; `NotFound` is not an error.
    async fn delete_from_replicas(
        &self,
        mount: &str,
        key_path: &str,
        ct: &CancellationToken,
    ) -> Vec<ClusterSyncStatus>;
}

/// Durable per-(secret, replica) journal (C2).
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    async fn get(
        &self,
        backend: &str,
        path: &str,
        destination: &str,
    ) -> Result<Option<SyncedSecretRecord>, StoreError>;

    /// Ordered by backend, path, destination.
    async fn list_all(&self) -> Result<Vec<SyncedSecretRecord>, StoreError>;

    /// Insert or replace by primary key (backend, path, destination).
    async fn upsert(&self, record: &SyncedSecretRecord) -> Result<(), StoreError>;

    /// Idempotent; deleting a non-existent row is success.
    async fn delete(&self, backend: &str, path: &str, destination: &str)
        -> Result<(), StoreError>;
}

/// Pure predicate and traversal-pruning filter (C3).
///
/// Both methods are deterministic and side-effect free: same inputs always
/// produce the same output (spec §8 invariant).
pub trait PathMatcher: Send + Sync {
    /// Decision function from spec §4.3; order-sensitive: mount check, then
    /// ignore, then replicate.
    fn should_sync(&self, mount: &str, key_path: &str) -> bool;

    /// Interior-node callback used while walking the main cluster's tree;
    /// purely an optimization, never more permissive than `should_sync`.
    fn should_traverse(&self, key_path: &str) -> bool;
}
