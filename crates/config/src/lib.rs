//! Vault-Sync configuration loading and validation (spec §6, §10.3).
//!
//! Configuration is layered: a file (YAML/JSON/TOML, sniffed by the `config`
//! crate from its extension) with a `VAULT_SYNC__`-prefixed environment
//! overlay, then validated before the engine is constructed. Validation
//! failures are class-1 errors (spec §7): fatal, no side effects yet.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Top-level configuration, matching the keys table in spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSyncConfig {
    pub id: String,
    /// Reserved for future periodic invocation (seconds).
    pub interval: u64,
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    pub postgres: PostgresConfig,
    pub vault: VaultConfig,
    pub sync_rule: SyncRuleConfig,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_concurrency() -> usize {
    8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl LogLevel {
    /// Maps to a `tracing` directive; tracing has no level below `error`,
    /// so `fatal`/`panic` both collapse to it.
    pub fn as_tracing_level(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal | LogLevel::Panic => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub address: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub db_name: String,
    pub ssl_mode: SslMode,
    pub ssl_root_cert_file: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("db_name", &self.db_name)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

fn default_max_connections() -> u32 {
    10
}

impl PostgresConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.username,
            self.password,
            self.address,
            self.port,
            self.db_name,
            ssl_mode_str(self.ssl_mode),
        )
    }
}

fn ssl_mode_str(mode: SslMode) -> &'static str {
    match mode {
        SslMode::Disable => "disable",
        SslMode::Allow => "allow",
        SslMode::Prefer => "prefer",
        SslMode::Require => "require",
        SslMode::VerifyCa => "verify-ca",
        SslMode::VerifyFull => "verify-full",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AppRoleCredentials {
    pub app_role_id: String,
    #[serde(skip_serializing)]
    pub app_role_secret: String,
    #[serde(default = "default_app_role_mount")]
    pub app_role_mount: String,
}

fn default_app_role_mount() -> String {
    "approle".to_string()
}

impl std::fmt::Debug for AppRoleCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRoleCredentials")
            .field("app_role_id", &self.app_role_id)
            .field("app_role_secret", &"***")
            .field("app_role_mount", &self.app_role_mount)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainClusterConfig {
    pub address: String,
    #[serde(flatten)]
    pub app_role: AppRoleCredentials,
    #[serde(default)]
    pub tls_skip_verify: bool,
    pub tls_cert_file: Option<String>,
    #[serde(default)]
    pub paths_to_replicate: HashSet<String>,
    #[serde(default)]
    pub paths_to_ignore: HashSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaClusterConfig {
    pub name: String,
    pub address: String,
    #[serde(flatten)]
    pub app_role: AppRoleCredentials,
    #[serde(default)]
    pub tls_skip_verify: bool,
    pub tls_cert_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub main_cluster: MainClusterConfig,
    pub replica_clusters: Vec<ReplicaClusterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRuleConfig {
    pub kv_mounts: Vec<String>,
    #[serde(default)]
    pub paths_to_replicate: HashSet<String>,
    #[serde(default)]
    pub paths_to_ignore: HashSet<String>,
}

/// Configuration errors (spec §7 class 1: fatal, detected before any side effect).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration from {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: config::ConfigError,
    },

    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl VaultSyncConfig {
    /// Loads from `path`, overlaying `VAULT_SYNC__`-prefixed environment
    /// variables (double underscore as the nesting separator), then
    /// validates. No engine construction may begin until this returns `Ok`.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("VAULT_SYNC").separator("__"))
            .build()
            .map_err(|source| ConfigError::Load {
                path: path.to_string(),
                source,
            })?;

        let cfg: VaultSyncConfig = settings.try_deserialize().map_err(|source| ConfigError::Load {
            path: path.to_string(),
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the invariants listed in spec §6.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vault.replica_clusters.is_empty() {
            return Err(ConfigError::Validation(
                "at least one replica cluster is required".to_string(),
            ));
        }

        let mut seen_names = HashSet::new();
        for replica in &self.vault.replica_clusters {
            if !seen_names.insert(&replica.name) {
                return Err(ConfigError::Validation(format!(
                    "duplicate replica cluster name: {}",
                    replica.name
                )));
            }
            validate_url(&replica.address)?;
        }
        validate_url(&self.vault.main_cluster.address)?;

        let overlap: Vec<&String> = self
            .vault
            .main_cluster
            .paths_to_replicate
            .intersection(&self.vault.main_cluster.paths_to_ignore)
            .collect();
        if !overlap.is_empty() {
            return Err(ConfigError::Validation(format!(
                "main cluster paths_to_replicate and paths_to_ignore must be disjoint, overlap: {overlap:?}"
            )));
        }

        if self
            .sync_rule
            .paths_to_replicate
            .iter()
            .any(|p| p == "*")
        {
            return Err(ConfigError::Validation(
                "the standalone pattern \"*\" is too broad and is rejected".to_string(),
            ));
        }

        if self.postgres.port == 0 {
            return Err(ConfigError::Validation(
                "postgres.port must be in (0, 65536)".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(ConfigError::Validation(
                "concurrency must be >= 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_url(addr: &str) -> Result<(), ConfigError> {
    url::Url::parse(addr)
        .map(|_| ())
        .map_err(|e| ConfigError::Validation(format!("invalid URL {addr}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_toml() -> &'static str {
        r#"
id = "prod-sync"
interval = 300
concurrency = 4

[postgres]
address = "db.internal"
port = 5432
username = "vault_sync"
password = "hunter2"
db_name = "vault_sync"
ssl_mode = "require"

[vault.main_cluster]
address = "https://vault-main.internal:8200"
app_role_id = "role-1"
app_role_secret = "secret-1"
paths_to_replicate = ["team-a/**"]

[[vault.replica_clusters]]
name = "eu-west"
address = "https://vault-eu.internal:8200"
app_role_id = "role-2"
app_role_secret = "secret-2"

[sync_rule]
kv_mounts = ["team-a"]
"#
    }

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::with_suffix(".toml").unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_and_validates_a_well_formed_config() {
        let f = write_temp(sample_toml());
        let cfg = VaultSyncConfig::from_file(f.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.id, "prod-sync");
        assert_eq!(cfg.vault.replica_clusters.len(), 1);
        assert_eq!(cfg.vault.main_cluster.app_role.app_role_mount, "approle");
    }

    #[test]
    fn rejects_zero_replicas() {
        let toml = sample_toml().replace(
            "[[vault.replica_clusters]]\nname = \"eu-west\"\naddress = \"https://vault-eu.internal:8200\"\napp_role_id = \"role-2\"\napp_role_secret = \"secret-2\"\n",
            "",
        );
        let f = write_temp(&toml);
        let err = VaultSyncConfig::from_file(f.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_overlapping_replicate_and_ignore_on_main_cluster() {
        let toml = sample_toml().replace(
            "paths_to_replicate = [\"team-a/**\"]",
            "paths_to_replicate = [\"team-a/**\"]\npaths_to_ignore = [\"team-a/**\"]",
        );
        let f = write_temp(&toml);
        let err = VaultSyncConfig::from_file(f.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_standalone_star_pattern() {
        let toml = sample_toml().replace(
            "kv_mounts = [\"team-a\"]",
            "kv_mounts = [\"team-a\"]\npaths_to_replicate = [\"*\"]",
        );
        let f = write_temp(&toml);
        let err = VaultSyncConfig::from_file(f.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn log_level_maps_fatal_and_panic_to_tracing_error() {
        assert_eq!(LogLevel::Fatal.as_tracing_level(), "error");
        assert_eq!(LogLevel::Panic.as_tracing_level(), "error");
        assert_eq!(LogLevel::Info.as_tracing_level(), "info");
    }
}
