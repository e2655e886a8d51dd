//! # vault-sync-store
//!
//! Postgres-backed implementation of [`vault_sync_core::SyncStateStore`] (C2):
//! one row per `(secret_backend, secret_path, destination_cluster)`, forward-only
//! migrations, no soft-delete (rows are removed when the source secret is).

pub mod pool;
pub mod store;

pub use pool::{create_pool, run_migrations, PoolConfig};
pub use store::PostgresSyncStateStore;
