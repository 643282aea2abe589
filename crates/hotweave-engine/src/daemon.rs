//! Staleness daemon
//!
//! Background task that periodically reads the modification time of every
//! registered dynamic artifact and taints the ones whose backing file changed.
//! Scanning never compiles anything; recompilation happens on access.

use crate::registry::{ArtifactRegistry, StatOutcome};
use hotweave_kernel::{ArtifactKey, ReloadError, ReloadEvent, ReloadResult};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of one scan pass
#[derive(Debug, Default, Clone)]
pub struct ScanReport {
    /// Number of records whose file was checked
    pub checked: usize,
    /// Keys tainted by this pass
    pub tainted: Vec<ArtifactKey>,
    /// Records whose file could not be read; treated as not stale
    pub stat_failures: Vec<ArtifactKey>,
}

impl ScanReport {
    pub fn is_quiet(&self) -> bool {
        self.tainted.is_empty() && self.stat_failures.is_empty()
    }
}

/// Periodic modification-time scanner
#[derive(Clone)]
pub struct StalenessDaemon {
    registry: Arc<ArtifactRegistry>,
    interval: Duration,
    event_tx: broadcast::Sender<ReloadEvent>,
}

impl StalenessDaemon {
    pub fn new(
        registry: Arc<ArtifactRegistry>,
        interval: Duration,
        event_tx: broadcast::Sender<ReloadEvent>,
    ) -> Self {
        Self {
            registry,
            interval,
            event_tx,
        }
    }

    /// Check every non-tainted dynamic record once.
    pub async fn scan_once(&self) -> ScanReport {
        let mut report = ScanReport::default();

        for key in self.registry.keys() {
            let Some(record) = self.registry.get(&key) else {
                continue;
            };
            if record.tainted || !record.is_dynamic() {
                continue;
            }

            let path = record.source_path();
            let observed = match read_mtime(&path).await {
                Ok(observed) => observed,
                Err(e) => {
                    let err = ReloadError::FileStat { path, source: e };
                    warn!("{}", err);
                    report.stat_failures.push(key);
                    continue;
                }
            };
            report.checked += 1;

            if let StatOutcome::Tainted(engine) = self.registry.apply_mtime(&key, observed) {
                info!("Artifact changed: {} ({})", key, engine);
                if self.registry.mark_dirty(engine) {
                    debug!("Engine {} is now dirty", engine);
                    let _ = self.event_tx.send(ReloadEvent::EngineDirty { engine });
                }
                let _ = self.event_tx.send(ReloadEvent::Tainted {
                    key: key.clone(),
                    engine,
                });
                report.tainted.push(key);
            }
        }

        report
    }

    /// Scan once unless `shutdown` fires first, in which case the pass is
    /// abandoned with [`ReloadError::ShutdownInterrupt`].
    pub async fn scan_interruptible(
        &self,
        shutdown: &mut mpsc::Receiver<()>,
    ) -> ReloadResult<ScanReport> {
        tokio::select! {
            biased;
            _ = shutdown.recv() => Err(ReloadError::ShutdownInterrupt),
            report = self.scan_once() => Ok(report),
        }
    }

    /// Run the scan loop on the current runtime until the handle is shut down.
    pub fn spawn(self) -> DaemonHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        info!("Starting staleness daemon (interval {:?})", self.interval);

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }

                if self.registry.is_empty() {
                    continue;
                }
                let report = match self.scan_interruptible(&mut shutdown_rx).await {
                    Ok(report) => report,
                    Err(e) if e.is_shutdown() => {
                        debug!("{}", e);
                        break;
                    }
                    Err(e) => {
                        warn!("Scan failed: {}", e);
                        continue;
                    }
                };
                if !report.is_quiet() {
                    debug!(
                        "Scan checked {} artifact(s): {} tainted, {} stat failure(s)",
                        report.checked,
                        report.tainted.len(),
                        report.stat_failures.len()
                    );
                }
            }
            info!("Staleness daemon stopped");
        });

        DaemonHandle { shutdown_tx, join }
    }
}

async fn read_mtime(path: &std::path::Path) -> std::io::Result<SystemTime> {
    tokio::fs::metadata(path).await?.modified()
}

/// Handle to a running daemon
pub struct DaemonHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl DaemonHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Interrupt the sleep and wait for the loop to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            if !e.is_cancelled() {
                warn!("Staleness daemon ended abnormally: {}", e);
            }
        }
    }
}
