//! hotweave CLI - hot-reloading host and source checker

mod cli;
mod commands;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use error_stack::Report;
use hotweave_engine::ReloadEngine;
use hotweave_kernel::config::load_config_report;
use hotweave_kernel::{ConfigError, EngineConfig, EngineKind, ReloadConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries responses
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_command(cli))
}

async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(&cli)?;
    let engine = ReloadEngine::new(config).context("failed to build reload engine")?;

    match cli.command {
        Commands::Run => commands::run::run(engine).await,
        Commands::Check => commands::check::run(engine).await,
        Commands::List => commands::list::run(engine).await,
    }
}

fn build_config(cli: &Cli) -> anyhow::Result<ReloadConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_report(path)
            .map_err(|report: Report<ConfigError>| anyhow::anyhow!("{report:?}"))?,
        None => ReloadConfig::default(),
    };

    add_roots(&mut config, EngineKind::Script, &cli.script_roots);
    add_roots(&mut config, EngineKind::Native, &cli.native_roots);
    if let Some(root) = &cli.output_root {
        config.output_root = root.clone();
    }
    if let Some(ms) = cli.poll_ms {
        config = config.with_poll_interval(Duration::from_millis(ms));
    }

    config.validate()?;
    Ok(config)
}

fn add_roots(config: &mut ReloadConfig, kind: EngineKind, roots: &[PathBuf]) {
    if roots.is_empty() {
        return;
    }
    let mut engine = config
        .engine(kind)
        .cloned()
        .unwrap_or_else(|| EngineConfig::new(kind));
    engine.source_roots.extend(roots.iter().cloned());
    *config = std::mem::take(config).with_engine(engine);
}
