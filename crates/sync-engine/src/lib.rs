//! # vault-sync-engine
//!
//! The reconciliation layer: the Sync Job (C4) that decides, per replica,
//! whether a secret needs writing, and the Orchestrator (C5) that discovers
//! secrets and drives jobs at bounded concurrency.

pub mod job;
pub mod orchestrator;

pub use job::{run_sync_job, ExistenceCache};
pub use orchestrator::Orchestrator;

/// In-memory [`vault_sync_core::VaultGateway`]/[`vault_sync_core::SyncStateStore`]
/// fakes. Exposed outside `cfg(test)` (behind the `testing` feature) so that
/// the workspace-level end-to-end test can drive a real [`Orchestrator`]
/// without a live Vault cluster or Postgres instance.
#[cfg(any(test, feature = "testing"))]
pub mod fakes;

#[cfg(test)]
mod integration_tests;
