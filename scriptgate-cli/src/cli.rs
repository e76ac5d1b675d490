//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the script roots once and print the report
    Scan,

    /// Run the gateway until interrupted, rescanning on an interval
    Serve,

    /// List cataloged scripts
    List {
        /// Output format: table, json
        #[arg(long, value_name = "FORMAT", default_value = "table")]
        format: String,
    },

    /// Execute one script and print the outcome
    Run {
        /// Script id, relative path, or display name
        #[arg(long, value_name = "STRING")]
        script: String,

        /// JSON object with call parameters (example: --params='{"n":"5"}')
        #[arg(long, value_name = "JSON")]
        params: Option<String>,

        /// Per-run timeout in seconds, overriding the configured default
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,
    },

    /// Dependency cache management commands
    Deps {
        #[command(subcommand)]
        deps_cmd: DepsCommands,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum DepsCommands {
    /// Install dependency environments for the given scripts
    Install {
        /// Script files to prepare
        #[arg(value_name = "PATH", required = true)]
        scripts: Vec<PathBuf>,

        /// Reinstall even when a valid cache entry exists
        #[arg(long)]
        force: bool,
    },

    /// Remove cache entries older than the retention window
    Clean {
        /// Override the retention window in seconds
        #[arg(long, value_name = "SECONDS")]
        max_age: Option<u64>,
    },

    /// Show cache usage per runtime
    Stats,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration in use
    Show {
        /// Path to configuration file (optional, uses default loading logic)
        #[arg(long, value_name = "PATH")]
        config_file: Option<PathBuf>,

        /// Output format: yaml, json
        #[arg(long, value_name = "FORMAT", default_value = "yaml")]
        format: String,
    },
}
