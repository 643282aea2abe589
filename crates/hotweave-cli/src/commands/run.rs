//! `hotweave run` command implementation

use super::print_diagnostic;
use anyhow::{Context, bail};
use colored::Colorize;
use hotweave_engine::{ReloadEngine, Woven};
use hotweave_kernel::{ArtifactKey, ReloadEvent};
use serde_json::Value;
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// One parsed request line
#[derive(Debug, PartialEq)]
pub struct Request {
    pub artifact: ArtifactKey,
    pub operation: String,
    pub input: Value,
}

/// Parse `<artifact> <operation> [json input]`
pub fn parse_request(line: &str) -> anyhow::Result<Request> {
    let line = line.trim();
    let (artifact, rest) = line
        .split_once(char::is_whitespace)
        .context("expected `<artifact> <operation> [json input]`")?;
    let rest = rest.trim_start();
    let (operation, input) = match rest.split_once(char::is_whitespace) {
        Some((operation, input)) => (operation, input.trim()),
        None => (rest, ""),
    };
    if operation.is_empty() {
        bail!("missing operation for {}", artifact);
    }
    let input = if input.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(input).with_context(|| format!("invalid JSON input: {}", input))?
    };
    Ok(Request {
        artifact: ArtifactKey::new(artifact),
        operation: operation.to_string(),
        input,
    })
}

pub async fn run(engine: ReloadEngine) -> anyhow::Result<()> {
    let discovered = engine.discover_configured().await?;
    println!(
        "{} {} artifact(s); reading requests from stdin",
        "Discovered".green(),
        discovered.len()
    );

    let reporter = tokio::spawn(report_events(engine.subscribe()));
    engine.start()?;

    let mut handles: HashMap<ArtifactKey, Woven> = HashMap::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(engine.config().poll_interval());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() || line.trim_start().starts_with('#') {
                    continue;
                }
                match serve(&engine, &mut handles, &line).await {
                    Ok(value) => println!("{}", value),
                    Err(e) => eprintln!("{} {:#}", "error:".red().bold(), e),
                }
            }
            _ = ticker.tick() => {
                for purged in engine.purge_vanished().await {
                    handles.remove(&purged.record.key);
                }
                let summary = engine.refresh_dirty().await;
                if !summary.is_empty() {
                    debug!(
                        "Eager refresh: {} reloaded, {} failed",
                        summary.refreshed.len(),
                        summary.failed.len()
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    engine.stop().await;
    reporter.abort();
    Ok(())
}

async fn serve(
    engine: &ReloadEngine,
    handles: &mut HashMap<ArtifactKey, Woven>,
    line: &str,
) -> anyhow::Result<Value> {
    let request = parse_request(line)?;
    if !handles.contains_key(&request.artifact) {
        let woven = engine.weave(request.artifact.clone()).await?;
        handles.insert(request.artifact.clone(), woven);
    }
    let woven = handles
        .get(&request.artifact)
        .context("artifact handle vanished")?;

    let context = engine.begin_request();
    let value = woven
        .invoke(&context, &request.operation, request.input)
        .await?;
    Ok(value)
}

async fn report_events(mut events: broadcast::Receiver<ReloadEvent>) {
    loop {
        match events.recv().await {
            Ok(ReloadEvent::Recompiled {
                key,
                generation,
                duration,
                warnings,
            }) => {
                eprintln!(
                    "{} {} {} ({:?})",
                    "reloaded".green().bold(),
                    key,
                    generation,
                    duration
                );
                warnings.iter().for_each(print_diagnostic);
            }
            Ok(ReloadEvent::CompileFailed {
                key, diagnostics, ..
            }) => {
                eprintln!("{} {}", "compile failed".red().bold(), key);
                diagnostics.iter().for_each(print_diagnostic);
            }
            Ok(ReloadEvent::LoadFailed { key, error }) => {
                eprintln!("{} {}: {}", "load failed".red().bold(), key, error);
            }
            Ok(ReloadEvent::Purged { key, .. }) => {
                eprintln!("{} {}", "purged".yellow(), key);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Event reporter skipped {} event(s)", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
