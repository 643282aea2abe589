//! `hotweave list` command implementation

use colored::Colorize;
use hotweave_engine::ReloadEngine;
use hotweave_kernel::EngineKind;

pub async fn run(engine: ReloadEngine) -> anyhow::Result<()> {
    engine.discover_configured().await?;

    if engine.registry().is_empty() {
        println!("No artifacts found. Add source roots with --script or --native.");
        return Ok(());
    }

    for kind in EngineKind::ALL {
        let records = engine.registry().all_of(kind);
        if records.is_empty() {
            continue;
        }
        println!("{} ({})", kind.to_string().bold(), records.len());
        for record in records {
            println!(
                "  {:<32} {}",
                record.key.to_string().cyan(),
                record.source_path().display().to_string().dimmed()
            );
        }
    }
    Ok(())
}
