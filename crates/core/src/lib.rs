//! # vault-sync-core
//!
//! Shared data model, error taxonomy and behavior-interface traits used by
//! every Vault-Sync component.
//!
//! ## Module structure
//!
//! - `types`: data model from spec §3 (SecretPath, SecretMetadata,
//!   SyncedSecretRecord, RunSummary, ...)
//! - `traits`: VaultGateway / SyncStateStore / PathMatcher behavior
//!   interfaces, the dynamic-dispatch points named in spec §9
//! - `error`: per-responsibility error enums

pub mod error;
pub mod traits;
pub mod types;

pub use error::{GatewayError, OrchestratorError, StoreError};
pub use traits::{ListFilter, PathMatcher, SyncStateStore, VaultGateway};
pub use types::*;
