//! Core data model shared by every Vault-Sync component (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifies a cluster a Gateway operation targets.
///
/// The main cluster is always named implicitly; replicas are referenced by
/// the `name` configured in `vault.replica_clusters[*]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterId {
    Main,
    Replica(String),
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterId::Main => write!(f, "main"),
            ClusterId::Replica(name) => write!(f, "{name}"),
        }
    }
}

/// A (mount, key_path) pair identifying a secret on the main cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretPath {
    pub mount: String,
    pub key_path: String,
}

impl SecretPath {
    pub fn new(mount: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            mount: mount.into(),
            key_path: key_path.into(),
        }
    }
}

impl fmt::Display for SecretPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.mount, self.key_path)
    }
}

/// Per-version record inside [`SecretMetadata`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretVersionMetadata {
    pub version: u64,
    pub created_time: DateTime<Utc>,
    pub deletion_time: Option<DateTime<Utc>>,
    pub destroyed: bool,
}

/// Metadata for a versioned-KV secret, independent of its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretMetadata {
    /// Positive integer, or 0 if the current version is destroyed/deleted.
    pub current_version: u64,
    pub created_time: DateTime<Utc>,
    pub updated_time: DateTime<Utc>,
    pub versions: Vec<SecretVersionMetadata>,
}

impl SecretMetadata {
    /// Whether the current version is live (not deleted/destroyed).
    pub fn is_current_live(&self) -> bool {
        self.current_version != 0
            && self
                .versions
                .iter()
                .find(|v| v.version == self.current_version)
                .map(|v| !v.destroyed && v.deletion_time.is_none())
                .unwrap_or(false)
    }
}

/// Opaque field-name -> value mapping for a KV v2 secret body.
pub type SecretData = serde_json::Map<String, serde_json::Value>;

/// A secret's current version, as read from the main cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretPayload {
    pub data: SecretData,
    pub metadata: SecretMetadata,
}

/// `status` column of a [`SyncedSecretRecord`] (spec §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
    Pending,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Success => write!(f, "success"),
            SyncStatus::Failed => write!(f, "failed"),
            SyncStatus::Pending => write!(f, "pending"),
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            "pending" => Ok(SyncStatus::Pending),
            other => Err(format!("invalid sync status: {other}")),
        }
    }
}

/// Durable per-(secret, replica) sync journal entry (primary entity of C2).
///
/// Primary key is `(secret_backend, secret_path, destination_cluster)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncedSecretRecord {
    pub secret_backend: String,
    pub secret_path: String,
    pub destination_cluster: String,
    pub source_version: i64,
    pub destination_version: Option<i64>,
    pub last_sync_attempt: DateTime<Utc>,
    pub last_sync_success: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub error_message: Option<String>,
}

/// Outcome of reconciling one replica for one secret within a Sync Job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterSyncOutcome {
    Updated,
    Deleted,
    Noop,
    Failed,
    ErrorDeleting,
    /// The run was cancelled before this replica could be reconciled.
    Cancelled,
}

/// Transient per-job, per-replica result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSyncStatus {
    pub destination_cluster: String,
    pub outcome: ClusterSyncOutcome,
    pub error: Option<String>,
}

impl ClusterSyncStatus {
    pub fn ok(destination_cluster: impl Into<String>, outcome: ClusterSyncOutcome) -> Self {
        Self {
            destination_cluster: destination_cluster.into(),
            outcome,
            error: None,
        }
    }

    pub fn err(
        destination_cluster: impl Into<String>,
        outcome: ClusterSyncOutcome,
        error: impl Into<String>,
    ) -> Self {
        Self {
            destination_cluster: destination_cluster.into(),
            outcome,
            error: Some(error.into()),
        }
    }
}

/// Result of reconciling one (mount, key_path) across all replicas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJobResult {
    pub mount: String,
    pub key_path: String,
    pub per_replica: Vec<ClusterSyncStatus>,
    /// Set only for failures before per-replica work began (read-from-main
    /// failure, or cancellation).
    pub error: Option<String>,
}

impl SyncJobResult {
    pub fn secret_path(&self) -> SecretPath {
        SecretPath::new(self.mount.clone(), self.key_path.clone())
    }
}

/// Classification of a [`SyncJobResult`] at the Orchestrator level (spec §4.5 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobClassification {
    Successful,
    Failed,
    Noop,
    Skipped,
}

/// Aggregate totals and full per-job detail for a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub noop: usize,
    pub skipped: usize,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub results: Vec<SyncJobResult>,
}

impl RunSummary {
    pub fn empty(duration: Duration) -> Self {
        Self {
            total: 0,
            successful: 0,
            failed: 0,
            noop: 0,
            skipped: 0,
            duration,
            results: Vec::new(),
        }
    }
}

mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_path_display() {
        let p = SecretPath::new("team-a", "app1/db");
        assert_eq!(p.to_string(), "team-a/app1/db");
    }

    #[test]
    fn sync_status_round_trips_through_str() {
        for s in [SyncStatus::Success, SyncStatus::Failed, SyncStatus::Pending] {
            let parsed: SyncStatus = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn cluster_id_display() {
        assert_eq!(ClusterId::Main.to_string(), "main");
        assert_eq!(ClusterId::Replica("eu-west".into()).to_string(), "eu-west");
    }

    #[test]
    fn is_current_live_false_when_current_version_zero() {
        let meta = SecretMetadata {
            current_version: 0,
            created_time: Utc::now(),
            updated_time: Utc::now(),
            versions: vec![],
        };
        assert!(!meta.is_current_live());
    }
}
