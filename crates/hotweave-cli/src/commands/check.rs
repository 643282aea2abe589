//! `hotweave check` command implementation

use super::print_diagnostic;
use anyhow::bail;
use colored::Colorize;
use hotweave_engine::ReloadEngine;
use hotweave_kernel::EngineKind;

pub async fn run(engine: ReloadEngine) -> anyhow::Result<()> {
    engine.discover_configured().await?;

    let kinds: Vec<EngineKind> = engine.config().enabled_engines().map(|e| e.kind).collect();
    let mut failed = 0;

    for kind in kinds {
        let artifacts = engine.registry().all_of(kind).len();
        if artifacts == 0 {
            continue;
        }
        println!("{} {} {} artifact(s)", "Checking".green().bold(), artifacts, kind);

        let report = engine.rebuild_engine(kind).await?;
        report.diagnostics.iter().for_each(print_diagnostic);

        for key in &report.refreshed {
            println!("  {} {}", "ok".green(), key);
        }
        for key in &report.failed {
            println!("  {} {}", "FAILED".red().bold(), key);
        }
        failed += report.failed.len();
    }

    if failed > 0 {
        bail!("{} artifact(s) failed to compile or load", failed);
    }
    println!("{}", "All artifacts compiled".green());
    Ok(())
}
