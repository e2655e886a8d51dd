//! Top-level error type for the CLI boundary.
//!
//! Every lower layer (`vault-sync-config`, `vault-sync-core`,
//! `vault-sync-store`) has its own `thiserror` enum; this crate converts all
//! of them into [`anyhow::Error`] at the outermost boundary per the layering
//! in spec §10.2, rather than inventing a second parallel taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] vault_sync_config::ConfigError),

    #[error("database connection failed: {0}")]
    Store(#[from] vault_sync_core::StoreError),

    #[error("{0}")]
    Orchestrator(#[from] vault_sync_core::OrchestratorError),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] vault_sync_path_matcher::PatternError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no such config section: {0}")]
    UnknownConfigSection(String),
}
