//! # vault-sync-gateway
//!
//! The cluster-agnostic Vault API (C1): one authenticated session per
//! cluster, versioned-KV tree enumeration, and the read-main/write-replicas
//! fan-out that every Sync Job drives.

pub mod error;
pub mod gateway;
pub mod session;

pub use gateway::VaultSyncGateway;
pub use session::ClusterEndpoint;

/// The TLS backend `vaultrs` was compiled against, per the `rustls` feature
/// selected in the workspace `Cargo.toml`. Update this if that feature flag
/// ever changes.
pub const TLS_BACKEND: &str = "rustls";

#[cfg(test)]
mod tests {
    use super::*;
    use vault_sync_core::{ClusterId, VaultGateway};

    fn endpoint(name: &str) -> ClusterEndpoint {
        ClusterEndpoint {
            name: name.to_string(),
            address: format!("https://{name}.invalid:8200"),
            app_role_id: "role".to_string(),
            app_role_secret: "secret".to_string(),
            app_role_mount: "approle".to_string(),
            tls_skip_verify: true,
            tls_cert_file: None,
        }
    }

    #[test]
    fn replica_names_are_sorted_regardless_of_construction_order() {
        let gw = VaultSyncGateway::new(
            endpoint("main"),
            vec![endpoint("zulu"), endpoint("alpha"), endpoint("mike")],
        );
        assert_eq!(gw.replica_names(), vec!["alpha", "mike", "zulu"]);
    }

    #[test]
    fn unknown_replica_cluster_is_rejected() {
        let gw = VaultSyncGateway::new(endpoint("main"), vec![endpoint("eu-west")]);
        let err = gw.session_for(&ClusterId::Replica("eu-east".to_string()));
        assert!(err.is_err());
    }
}
