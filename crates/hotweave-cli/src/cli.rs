//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// hotweave - hot-reload scripts and native extensions into a running host
#[derive(Parser)]
#[command(name = "hotweave")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (TOML, YAML or JSON)
    #[arg(short = 'c', long, global = true, env = "HOTWEAVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Extra source root for script artifacts
    #[arg(long = "script", global = true, value_name = "DIR")]
    pub script_roots: Vec<PathBuf>,

    /// Extra source root for native artifacts
    #[arg(long = "native", global = true, value_name = "DIR")]
    pub native_roots: Vec<PathBuf>,

    /// Override the compiled-output root
    #[arg(long, global = true, value_name = "DIR")]
    pub output_root: Option<PathBuf>,

    /// Override the poll interval in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub poll_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Serve requests from stdin, reloading artifacts as their sources change.
    ///
    /// Each line is one request: `<artifact> <operation> [json input]`.
    Run,

    /// Compile and load every artifact once and report diagnostics
    Check,

    /// List the artifacts found under the configured source roots
    List,
}
