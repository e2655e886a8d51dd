//! Shared error taxonomy for Vault-Sync.
//!
//! Each crate that owns a behavior-interface trait (`VaultGateway`,
//! `SyncStateStore`) gets its own error enum here rather than a single
//! monolithic type, matching error classes to the taxonomy in spec §7:
//! configuration, bootstrap, transient per-operation, absence, cancellation.

use thiserror::Error;

/// Errors surfaced by a [`crate::traits::VaultGateway`] implementation.
///
/// `NotFound` is the "absence" class from §7 item 4: read-oriented calls
/// distinguish it from other failures so callers can treat a missing
/// secret as data, not an error condition.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("vault authentication failed for cluster {cluster}: {source}")]
    Authentication {
        cluster: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("vault request failed for cluster {cluster}: {source}")]
    Request {
        cluster: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("unknown cluster: {0}")]
    UnknownCluster(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }
}

/// Errors surfaced by a [`crate::traits::SyncStateStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sync-state store connection failed: {0}")]
    Connection(String),

    #[error("sync-state store query failed: {0}")]
    Query(String),

    #[error("sync-state store migration failed: {0}")]
    Migration(String),
}

/// Errors surfaced by the Orchestrator (C5) outside of per-job failures,
/// which are instead folded into [`crate::types::RunSummary`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("run cancelled before it could start")]
    CancelledBeforeStart,

    #[error("run cancelled while in progress")]
    CancelledDuringRun,

    #[error("discovery failed: {0}")]
    Discovery(String),
}
