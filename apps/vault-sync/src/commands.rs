//! Implementations of each CLI subcommand.

use std::io::{BufRead, Write};
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::info;
use vault_sync_config::VaultSyncConfig;
use vault_sync_core::PathMatcher;

use crate::engine_build::{build_orchestrator, build_path_matcher};
use crate::error::AppError;

pub async fn sync(config: &VaultSyncConfig, ct: &CancellationToken) -> Result<(), AppError> {
    let orchestrator = build_orchestrator(config).await?;
    let summary = orchestrator.run_once(ct).await?;

    info!(
        total = summary.total,
        successful = summary.successful,
        failed = summary.failed,
        noop = summary.noop,
        skipped = summary.skipped,
        duration_secs = summary.duration.as_secs_f64(),
        "sync run complete"
    );

    let json = serde_json::to_string_pretty(&summary).map_err(|e| AppError::Io(std::io::Error::other(e)))?;
    println!("{json}");

    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Prints the whole resolved config, or just `section` (a dotted path such
/// as `vault.main_cluster`) when given.
pub fn print_config(config: &VaultSyncConfig, section: Option<&str>) -> Result<(), AppError> {
    let value = serde_json::to_value(config).map_err(|e| AppError::Io(std::io::Error::other(e)))?;
    let scoped = match section {
        Some(path) => select_section(&value, path)?,
        None => &value,
    };
    let redacted =
        serde_json::to_string_pretty(scoped).map_err(|e| AppError::Io(std::io::Error::other(e)))?;
    println!("{redacted}");
    Ok(())
}

fn select_section<'a>(root: &'a serde_json::Value, path: &str) -> Result<&'a serde_json::Value, AppError> {
    let mut current = root;
    for segment in path.split('.') {
        current = current
            .get(segment)
            .ok_or_else(|| AppError::UnknownConfigSection(path.to_string()))?;
    }
    Ok(current)
}

/// Reads `mount/key_path` lines from `paths_file` (or stdin for `-`) and
/// prints each one's `should_sync` verdict, without touching Vault.
pub fn dry_run_path_match(config: &VaultSyncConfig, paths_file: &Path) -> Result<(), AppError> {
    let matcher = build_path_matcher(config)?;

    let reader: Box<dyn BufRead> = if paths_file == Path::new("-") {
        Box::new(std::io::BufReader::new(std::io::stdin()))
    } else {
        Box::new(std::io::BufReader::new(std::fs::File::open(paths_file)?))
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((mount, key_path)) = line.split_once('/') else {
            writeln!(out, "{line}\tSKIP\tmissing '/' separator between mount and key_path")?;
            continue;
        };
        let verdict = if matcher.should_sync(mount, key_path) { "SYNC" } else { "SKIP" };
        writeln!(out, "{line}\t{verdict}")?;
    }
    Ok(())
}

pub fn version() {
    println!(
        "vault-sync {} (vault tls backend: {})",
        env!("CARGO_PKG_VERSION"),
        vault_sync_gateway::TLS_BACKEND
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Write as _;
    use vault_sync_config::{
        AppRoleCredentials, LogLevel, MainClusterConfig, PostgresConfig, SslMode, SyncRuleConfig,
        VaultConfig,
    };

    fn sample_config() -> VaultSyncConfig {
        VaultSyncConfig {
            id: "test-sync".to_string(),
            interval: 300,
            log_level: LogLevel::Info,
            concurrency: 4,
            postgres: PostgresConfig {
                address: "db.internal".to_string(),
                port: 5432,
                username: "vault_sync".to_string(),
                password: "hunter2".to_string(),
                db_name: "vault_sync".to_string(),
                ssl_mode: SslMode::Require,
                ssl_root_cert_file: None,
                max_connections: 10,
            },
            vault: VaultConfig {
                main_cluster: MainClusterConfig {
                    address: "https://vault-main.internal:8200".to_string(),
                    app_role: AppRoleCredentials {
                        app_role_id: "role-1".to_string(),
                        app_role_secret: "secret-1".to_string(),
                        app_role_mount: "approle".to_string(),
                    },
                    tls_skip_verify: false,
                    tls_cert_file: None,
                    paths_to_replicate: HashSet::new(),
                    paths_to_ignore: HashSet::new(),
                },
                replica_clusters: vec![],
            },
            sync_rule: SyncRuleConfig {
                kv_mounts: vec!["team-a".to_string()],
                paths_to_replicate: HashSet::from(["team-a/*".to_string()]),
                paths_to_ignore: HashSet::new(),
            },
        }
    }

    #[test]
    fn print_config_redacts_passwords_and_app_role_secrets() {
        let config = sample_config();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("secret-1"));
    }

    #[test]
    fn print_config_section_selects_a_dotted_path() {
        let config = sample_config();
        let value = serde_json::to_value(&config).unwrap();
        let section = select_section(&value, "sync_rule").unwrap();
        assert_eq!(section["kv_mounts"], serde_json::json!(["team-a"]));
    }

    #[test]
    fn print_config_unknown_section_is_an_error() {
        let config = sample_config();
        let value = serde_json::to_value(&config).unwrap();
        assert!(select_section(&value, "does.not.exist").is_err());
    }

    #[test]
    fn dry_run_path_match_classifies_in_and_out_of_scope_paths() {
        let config = sample_config();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "team-a/app1/db").unwrap();
        writeln!(file, "team-b/app1/db").unwrap();
        dry_run_path_match(&config, file.path()).unwrap();
    }
}
