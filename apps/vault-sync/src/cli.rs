//! Command-line surface, parsed with `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "vault-sync", version, about = "One-way fan-out replication of versioned KV secrets across Vault clusters")]
pub struct Cli {
    /// Path to the TOML/YAML/JSON configuration file.
    #[arg(short, long, global = true, default_value = "vault-sync.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discovers in-scope secrets and reconciles each against every replica once.
    Sync,

    /// Loads and validates the configuration, then prints it with secrets redacted.
    PrintConfig {
        /// Dotted path into the resolved config to print (e.g. `vault.main_cluster`,
        /// `sync_rule`). Prints the whole document when omitted.
        #[arg(value_name = "SECTION")]
        section: Option<String>,
    },

    /// Evaluates the replicate/ignore rules against a newline-delimited list of
    /// `mount/key_path` entries, without contacting Vault.
    DryRunPathMatch {
        /// File containing one `mount/key_path` entry per line; `-` reads stdin.
        #[arg(value_name = "FILE")]
        paths_file: PathBuf,
    },

    /// Prints the build version.
    Version,
}
