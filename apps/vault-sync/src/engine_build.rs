//! Wires a loaded [`VaultSyncConfig`] into a runnable [`Orchestrator`].

use std::sync::Arc;

use vault_sync_config::VaultSyncConfig;
use vault_sync_core::{PathMatcher, SyncStateStore, VaultGateway};
use vault_sync_engine::Orchestrator;
use vault_sync_gateway::{ClusterEndpoint, VaultSyncGateway};
use vault_sync_path_matcher::GlobPathMatcher;
use vault_sync_store::{pool, PostgresSyncStateStore};

use crate::error::AppError;

pub fn build_gateway(config: &VaultSyncConfig) -> VaultSyncGateway {
    let main = ClusterEndpoint {
        name: "main".to_string(),
        address: config.vault.main_cluster.address.clone(),
        app_role_id: config.vault.main_cluster.app_role.app_role_id.clone(),
        app_role_secret: config.vault.main_cluster.app_role.app_role_secret.clone(),
        app_role_mount: config.vault.main_cluster.app_role.app_role_mount.clone(),
        tls_skip_verify: config.vault.main_cluster.tls_skip_verify,
        tls_cert_file: config.vault.main_cluster.tls_cert_file.clone(),
    };

    let replicas = config
        .vault
        .replica_clusters
        .iter()
        .map(|r| ClusterEndpoint {
            name: r.name.clone(),
            address: r.address.clone(),
            app_role_id: r.app_role.app_role_id.clone(),
            app_role_secret: r.app_role.app_role_secret.clone(),
            app_role_mount: r.app_role.app_role_mount.clone(),
            tls_skip_verify: r.tls_skip_verify,
            tls_cert_file: r.tls_cert_file.clone(),
        })
        .collect();

    VaultSyncGateway::new(main, replicas)
}

pub fn build_path_matcher(config: &VaultSyncConfig) -> Result<GlobPathMatcher, AppError> {
    let mut replicate: Vec<String> = config.sync_rule.paths_to_replicate.iter().cloned().collect();
    replicate.extend(config.vault.main_cluster.paths_to_replicate.iter().cloned());

    let mut ignore: Vec<String> = config.sync_rule.paths_to_ignore.iter().cloned().collect();
    ignore.extend(config.vault.main_cluster.paths_to_ignore.iter().cloned());

    GlobPathMatcher::new(config.sync_rule.kv_mounts.clone(), replicate, ignore).map_err(AppError::from)
}

pub async fn build_store(config: &VaultSyncConfig) -> Result<PostgresSyncStateStore, AppError> {
    let pool_config = pool::PoolConfig {
        max_connections: config.postgres.max_connections,
        ..pool::PoolConfig::default()
    };
    let pg_pool = pool::create_pool(&config.postgres.connection_url(), &pool_config)
        .await
        .map_err(AppError::Store)?;
    pool::run_migrations(&pg_pool).await.map_err(AppError::Store)?;
    Ok(PostgresSyncStateStore::new(pg_pool))
}

pub async fn build_orchestrator(config: &VaultSyncConfig) -> Result<Orchestrator, AppError> {
    let gateway: Arc<dyn VaultGateway> = Arc::new(build_gateway(config));
    let store: Arc<dyn SyncStateStore> = Arc::new(build_store(config).await?);
    let matcher: Arc<dyn PathMatcher> = Arc::new(build_path_matcher(config)?);

    Ok(Orchestrator::new(
        gateway,
        store,
        matcher,
        config.sync_rule.kv_mounts.clone(),
        config.concurrency,
    ))
}
