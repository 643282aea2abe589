//! Reload engine
//!
//! Process-wide facade owning the registry, the staleness daemon, the
//! compiler backends and the generation loader. Cheap to clone; every clone
//! refers to the same engine.

use crate::backend::{
    CompileUnit, CompiledArtifact, CompilerBackend, NativeBackend, ScriptBackend,
    discover_sources,
};
use crate::daemon::{DaemonHandle, ScanReport, StalenessDaemon};
use crate::loader::{Binding, Generation, GenerationLoader};
use crate::registry::ArtifactRegistry;
use crate::weaving::{RequestContext, Woven};
use dashmap::DashMap;
use futures::future::join_all;
use hotweave_kernel::{
    ArtifactKey, ArtifactRecord, ArtifactType, Diagnostic, EngineKind, GenerationId,
    ReloadConfig, ReloadError, ReloadEvent, ReloadResult, Reloadability, StaticDefinition,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Record and last generation of a purged artifact
#[derive(Debug)]
pub struct PurgedArtifact {
    pub record: ArtifactRecord,
    pub generation: Option<Arc<Generation>>,
}

/// Outcome of a full-engine rebuild
#[derive(Debug, Default)]
pub struct RebuildReport {
    /// Artifacts that received a new generation
    pub refreshed: Vec<ArtifactKey>,
    /// Registered artifacts whose source failed to compile or load
    pub failed: Vec<ArtifactKey>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Outcome of [`ReloadEngine::refresh_dirty`]
#[derive(Debug, Default)]
pub struct RefreshSummary {
    pub refreshed: Vec<ArtifactKey>,
    pub failed: Vec<ArtifactKey>,
    /// Engines handled with a full rebuild
    pub rebuilt: Vec<EngineKind>,
}

impl RefreshSummary {
    pub fn is_empty(&self) -> bool {
        self.refreshed.is_empty() && self.failed.is_empty()
    }
}

/// Builder for [`ReloadEngine`]
pub struct ReloadEngineBuilder {
    config: ReloadConfig,
    backends: HashMap<EngineKind, Arc<dyn CompilerBackend>>,
    statics: Vec<(ArtifactKey, StaticDefinition)>,
}

impl ReloadEngineBuilder {
    pub fn new(config: ReloadConfig) -> Self {
        Self {
            config,
            backends: HashMap::new(),
            statics: Vec::new(),
        }
    }

    /// Use a custom backend for its engine kind
    pub fn backend(mut self, backend: Arc<dyn CompilerBackend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    /// Register a definition compiled into the host
    pub fn static_definition(mut self, key: impl Into<ArtifactKey>, definition: StaticDefinition) -> Self {
        self.statics.push((key.into(), definition));
        self
    }

    pub fn build(self) -> ReloadResult<ReloadEngine> {
        self.config.validate()?;

        let mut backends: HashMap<EngineKind, Arc<dyn CompilerBackend>> = HashMap::new();
        for kind in EngineKind::ALL {
            if !self.config.is_enabled(kind) {
                debug!("Engine {} disabled", kind);
                continue;
            }
            let backend = match self.backends.get(&kind) {
                Some(custom) => custom.clone(),
                None => default_backend(kind, &self.config),
            };
            backends.insert(kind, backend);
        }

        let loader = GenerationLoader::new();
        for (key, definition) in self.statics {
            loader.register_static(key, definition);
        }

        let (event_tx, _) = broadcast::channel(self.config.event_capacity.max(1));
        info!(
            "Reload engine built with engines: {:?}",
            backends.keys().map(|k| k.as_str()).collect::<Vec<_>>()
        );

        Ok(ReloadEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                registry: Arc::new(ArtifactRegistry::new()),
                loader,
                backends,
                compile_locks: DashMap::new(),
                diagnostics: DashMap::new(),
                event_tx,
                daemon: parking_lot::Mutex::new(None),
            }),
        })
    }
}

fn default_backend(kind: EngineKind, config: &ReloadConfig) -> Arc<dyn CompilerBackend> {
    match kind {
        EngineKind::Script => Arc::new(ScriptBackend::new(config.script.clone())),
        EngineKind::Native => Arc::new(NativeBackend::new(config.native.clone())),
    }
}

struct EngineInner {
    config: ReloadConfig,
    registry: Arc<ArtifactRegistry>,
    loader: GenerationLoader,
    backends: HashMap<EngineKind, Arc<dyn CompilerBackend>>,
    /// One recompile at a time per artifact
    compile_locks: DashMap<ArtifactKey, Arc<Mutex<()>>>,
    /// Diagnostics of the most recent compile per engine
    diagnostics: DashMap<EngineKind, Vec<Diagnostic>>,
    event_tx: broadcast::Sender<ReloadEvent>,
    daemon: parking_lot::Mutex<Option<DaemonHandle>>,
}

/// Hot-reload engine
#[derive(Clone)]
pub struct ReloadEngine {
    inner: Arc<EngineInner>,
}

impl ReloadEngine {
    pub fn builder(config: ReloadConfig) -> ReloadEngineBuilder {
        ReloadEngineBuilder::new(config)
    }

    /// Engine with the default backends for every enabled engine kind
    pub fn new(config: ReloadConfig) -> ReloadResult<Self> {
        ReloadEngineBuilder::new(config).build()
    }

    pub fn config(&self) -> &ReloadConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<ArtifactRegistry> {
        &self.inner.registry
    }

    pub fn loader(&self) -> &GenerationLoader {
        &self.inner.loader
    }

    /// Subscribe to reload events
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.inner.event_tx.subscribe()
    }

    fn emit(&self, event: ReloadEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    fn backend(&self, kind: EngineKind) -> ReloadResult<Arc<dyn CompilerBackend>> {
        self.inner
            .backends
            .get(&kind)
            .cloned()
            .ok_or(ReloadError::EngineDisabled(kind))
    }

    fn compile_lock(&self, key: &ArtifactKey) -> Arc<Mutex<()>> {
        self.inner
            .compile_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn daemon(&self) -> StalenessDaemon {
        StalenessDaemon::new(
            self.inner.registry.clone(),
            self.inner.config.poll_interval(),
            self.inner.event_tx.clone(),
        )
    }

    /// Start the staleness daemon on the current runtime
    pub fn start(&self) -> ReloadResult<()> {
        let mut slot = self.inner.daemon.lock();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(ReloadError::AlreadyRunning);
        }
        *slot = Some(self.daemon().spawn());
        info!("Reload engine started");
        Ok(())
    }

    /// Stop the staleness daemon. Live generations are not touched.
    pub async fn stop(&self) {
        let handle = self.inner.daemon.lock().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            info!("Reload engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .daemon
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Run one scan pass now, independently of the daemon
    pub async fn scan_now(&self) -> ScanReport {
        self.daemon().scan_once().await
    }

    /// Register an artifact. Returns `false` if the key was already registered.
    pub async fn register_artifact(
        &self,
        key: impl Into<ArtifactKey>,
        source_root: impl Into<PathBuf>,
        file_name: impl Into<PathBuf>,
        engine: EngineKind,
        artifact_type: ArtifactType,
        reloadability: Reloadability,
    ) -> ReloadResult<bool> {
        let record = ArtifactRecord::new(key, source_root, file_name, engine)
            .with_artifact_type(artifact_type)
            .with_reloadability(reloadability);
        self.register(record).await
    }

    /// Register a prepared record; its modification time is read from disk.
    pub async fn register(&self, record: ArtifactRecord) -> ReloadResult<bool> {
        if record.is_dynamic() {
            self.backend(record.engine)?;
        }

        let path = record.source_path();
        let last_modified = match modified(&path).await {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("{}", ReloadError::FileStat { path: path.clone(), source: e });
                None
            }
        };
        let record = record.with_last_modified(last_modified);
        let key = record.key.clone();
        let engine = record.engine;

        let inserted = self.inner.registry.register(record);
        if inserted {
            self.emit(ReloadEvent::Registered { key, engine, path });
        }
        Ok(inserted)
    }

    /// Register a definition compiled into the host
    pub fn register_static(&self, key: impl Into<ArtifactKey>, definition: StaticDefinition) {
        self.inner.loader.register_static(key.into(), definition);
    }

    /// Whether calls for `key` go through the reload machinery
    pub fn is_dynamic(&self, key: &ArtifactKey) -> bool {
        self.inner
            .registry
            .get(key)
            .is_some_and(|r| r.is_dynamic())
    }

    /// Whether a holder of `held` should rebind: the artifact is tainted or a
    /// newer generation was published.
    pub fn pending(&self, key: &ArtifactKey, held: Option<GenerationId>) -> bool {
        match self.inner.registry.get(key) {
            Some(record) if record.is_dynamic() => {
                record.tainted || self.inner.loader.current_id(key) > held
            }
            _ => false,
        }
    }

    /// Freshest usable definition of `key`.
    ///
    /// Recompiles when the artifact is tainted or was never compiled. When the
    /// recompile fails the last good generation is returned; the error only
    /// surfaces when there is none.
    pub async fn resolve(&self, key: &ArtifactKey) -> ReloadResult<Binding> {
        let Some(record) = self.inner.registry.get(key) else {
            return match self.inner.loader.static_definition(key) {
                Some(definition) => Ok(Binding::Static(definition)),
                None => Err(ReloadError::UnknownArtifact(key.clone())),
            };
        };
        if !record.is_dynamic() {
            return self.inner.loader.resolve(key).map_err(Into::into);
        }

        if !record.tainted {
            if let Some(current) = self.inner.loader.current(key) {
                return Ok(Binding::Generation(current));
            }
        }

        match self.refresh(key).await {
            Ok(generation) => Ok(Binding::Generation(generation)),
            Err(e) => match self.inner.loader.current(key) {
                Some(previous) => {
                    warn!("Serving {} of {} after failed reload: {}", previous.id(), key, e);
                    Ok(Binding::Generation(previous))
                }
                None => Err(e),
            },
        }
    }

    /// Recompile `key` if it is tainted or has no generation yet, surfacing
    /// compile and load errors.
    pub async fn refresh(&self, key: &ArtifactKey) -> ReloadResult<Arc<Generation>> {
        let engine = self
            .inner
            .registry
            .get(key)
            .ok_or_else(|| ReloadError::UnknownArtifact(key.clone()))?
            .engine;
        let backend = self.backend(engine)?;

        let lock = self.compile_lock(key);
        let _guard = lock.lock().await;

        // re-check: the compile may have happened while we waited
        let record = self
            .inner
            .registry
            .get(key)
            .ok_or_else(|| ReloadError::Unavailable(key.clone()))?;
        let current = self.inner.loader.current(key);
        if let Some(current) = &current {
            if !record.tainted {
                return Ok(current.clone());
            }
        }

        let id = current
            .as_ref()
            .map(|g| g.id().next())
            .unwrap_or(GenerationId::FIRST);
        let output_dir = self.generation_dir(&record, id);
        tokio::fs::create_dir_all(&output_dir).await?;

        // read before compiling so edits made during the compile taint again
        let compiled_from = modified(&record.source_path()).await.ok();
        let started = Instant::now();
        info!("Recompiling {} ({}) as {}", key, engine, id);
        self.emit(ReloadEvent::CompileStarted {
            key: key.clone(),
            engine,
        });

        let classpath = self.inner.config.classpath(engine);
        let unit = CompileUnit {
            source_root: &record.source_root,
            classpath: &classpath,
            relative_path: &record.file_name,
            output_dir: &output_dir,
        };
        let compiled = match backend.compile(unit).await {
            Ok(compiled) => compiled,
            Err(e) => {
                self.report_compile_failure(key, engine, &e.diagnostics);
                self.inner.diagnostics.insert(engine, e.diagnostics.clone());
                remove_output(&output_dir).await;
                return Err(e.into());
            }
        };
        self.inner.diagnostics.insert(engine, compiled.warnings.clone());

        self.adopt(backend, &record, id, compiled, compiled_from, started)
            .await
    }

    /// Define, publish, then clear the taint. Caller holds the compile lock.
    /// Nothing is published if `record` was purged in the meantime.
    async fn adopt(
        &self,
        backend: Arc<dyn CompilerBackend>,
        record: &ArtifactRecord,
        id: GenerationId,
        compiled: CompiledArtifact,
        compiled_from: Option<SystemTime>,
        started: Instant,
    ) -> ReloadResult<Arc<Generation>> {
        let key = record.key.clone();
        let warnings = compiled.warnings.clone();
        let output_dir = compiled.output_dir.clone();

        let defined = tokio::task::spawn_blocking({
            let key = key.clone();
            move || Generation::define(backend.as_ref(), key, id, &compiled)
        })
        .await
        .map_err(|e| ReloadError::Internal(format!("define task failed: {}", e)))?;

        let generation = match defined {
            Ok(generation) => generation.with_reclaim(self.inner.config.reclaim_outputs),
            Err(e) => {
                warn!("Failed to load {} of {}: {}", id, key, e);
                self.emit(ReloadEvent::LoadFailed {
                    key: key.clone(),
                    error: e.to_string(),
                });
                remove_output(&output_dir).await;
                return Err(e.into());
            }
        };

        if !self.inner.registry.is_live(record) {
            debug!("{} was purged while {} was compiling", key, id);
            drop(generation);
            remove_output(&output_dir).await;
            return Err(ReloadError::Unavailable(key));
        }
        let generation = self.inner.loader.publish(generation);
        if !self
            .inner
            .registry
            .settle(record, generation.id(), compiled_from)
        {
            self.inner.loader.retract(&generation);
            return Err(ReloadError::Unavailable(key));
        }

        let duration = started.elapsed();
        info!("Reloaded {} as {} in {:?}", key, generation.id(), duration);
        for warning in &warnings {
            debug!("{}", warning);
        }
        self.emit(ReloadEvent::Recompiled {
            key,
            generation: generation.id(),
            duration,
            warnings,
        });
        Ok(generation)
    }

    fn report_compile_failure(&self, key: &ArtifactKey, engine: EngineKind, diagnostics: &[Diagnostic]) {
        warn!("Compile failed for {} with {} diagnostic(s)", key, diagnostics.len());
        for diagnostic in diagnostics {
            warn!("{}", diagnostic);
        }
        self.emit(ReloadEvent::CompileFailed {
            key: key.clone(),
            engine,
            diagnostics: diagnostics.to_vec(),
        });
    }

    /// `output_root/<engine>/<key>/gen-<n>-<uuid>`
    fn generation_dir(&self, record: &ArtifactRecord, id: GenerationId) -> PathBuf {
        self.inner
            .config
            .output_root
            .join(record.engine.as_str())
            .join(record.key.to_path_component())
            .join(format!("gen-{}-{}", id.get(), Uuid::now_v7()))
    }

    /// Stop tracking `key`. Live instances keep working; the returned
    /// generation is the last one that was current.
    pub fn purge(&self, key: &ArtifactKey) -> Option<PurgedArtifact> {
        let record = self.inner.registry.purge(key)?;
        let generation = self.inner.loader.evict(key);
        // a held lock stays so a re-registration queues behind the compile
        self.inner
            .compile_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        self.emit(ReloadEvent::Purged {
            key: key.clone(),
            last_generation: generation.as_ref().map(|g| g.id()),
        });
        Some(PurgedArtifact { record, generation })
    }

    /// Purge every registered artifact whose source file no longer exists
    pub async fn purge_vanished(&self) -> Vec<PurgedArtifact> {
        let mut purged = Vec::new();
        for key in self.inner.registry.keys() {
            let Some(record) = self.inner.registry.get(&key) else {
                continue;
            };
            if tokio::fs::try_exists(record.source_path()).await.unwrap_or(true) {
                continue;
            }
            info!("Source of {} vanished", key);
            purged.extend(self.purge(&key));
        }
        purged
    }

    /// Recompile the tainted artifacts of every dirty engine, concurrently
    /// per artifact or, past the configured threshold, as a full-engine
    /// rebuild.
    pub async fn refresh_dirty(&self) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        let mut kinds: Vec<EngineKind> = self.inner.backends.keys().copied().collect();
        kinds.sort();

        for kind in kinds {
            if !self.inner.registry.take_dirty(kind) {
                continue;
            }
            let tainted = self.inner.registry.tainted_of(kind);
            if tainted.is_empty() {
                continue;
            }

            if tainted.len() >= self.inner.config.full_rebuild_threshold {
                match self.rebuild_engine(kind).await {
                    Ok(report) => {
                        summary.refreshed.extend(report.refreshed);
                        summary.failed.extend(report.failed);
                        summary.rebuilt.push(kind);
                    }
                    Err(e) => {
                        warn!("Rebuild of {} failed: {}", kind, e);
                        summary.failed.extend(tainted.into_iter().map(|r| r.key));
                    }
                }
                continue;
            }

            let outcomes = join_all(tainted.into_iter().map(|record| async move {
                let outcome = self.refresh(&record.key).await;
                (record.key, outcome)
            }))
            .await;
            for (key, outcome) in outcomes {
                match outcome {
                    Ok(_) => summary.refreshed.push(key),
                    Err(e) => {
                        debug!("Refresh of {} failed: {}", key, e);
                        summary.failed.push(key);
                    }
                }
            }
        }
        summary
    }

    /// Compile every source of an engine in one batch and adopt the outputs
    /// of its tainted or never compiled artifacts.
    pub async fn rebuild_engine(&self, kind: EngineKind) -> ReloadResult<RebuildReport> {
        let backend = self.backend(kind)?;
        let classpath = self.inner.config.classpath(kind);
        let batch_root = self
            .inner
            .config
            .output_root
            .join(kind.as_str())
            .join(format!("batch-{}", Uuid::now_v7()));

        let mut roots: BTreeMap<PathBuf, Vec<ArtifactRecord>> = BTreeMap::new();
        for record in self.inner.registry.all_of(kind) {
            if record.is_dynamic() {
                roots.entry(record.source_root.clone()).or_default().push(record);
            }
        }

        info!("Rebuilding engine {} ({} source root(s))", kind, roots.len());
        let mut report = RebuildReport::default();

        for (index, (root, records)) in roots.iter().enumerate() {
            // records come sorted by key, so concurrent rebuilds lock in the same order
            let mut guards = Vec::with_capacity(records.len());
            for record in records {
                guards.push(self.compile_lock(&record.key).lock_owned().await);
            }

            let batch_dir = batch_root.join(format!("root-{}", index));
            let mut compiled_from = HashMap::new();
            for record in records {
                compiled_from.insert(record.key.clone(), modified(&record.source_path()).await.ok());
            }
            let started = Instant::now();
            let batch = backend.compile_all(root, &classpath, &batch_dir).await;
            report.diagnostics.extend(batch.diagnostics());

            for failure in &batch.failed {
                if let Some(record) = records.iter().find(|r| r.source_path() == failure.path) {
                    self.report_compile_failure(&record.key, kind, &failure.diagnostics);
                    report.failed.push(record.key.clone());
                }
            }

            for (relative, compiled) in batch.compiled {
                let Some(record) = records.iter().find(|r| r.file_name == relative) else {
                    backend.discard(&compiled);
                    remove_output(&compiled.output_dir).await;
                    continue;
                };
                let from = compiled_from.get(&record.key).copied().flatten();
                match self
                    .adopt_batch_output(backend.clone(), record, compiled, from, started)
                    .await
                {
                    Ok(Some(_)) => report.refreshed.push(record.key.clone()),
                    Ok(None) => {}
                    Err(_) => report.failed.push(record.key.clone()),
                }
            }
            drop(guards);
        }

        self.inner.diagnostics.insert(kind, report.diagnostics.clone());
        self.emit(ReloadEvent::EngineRebuilt {
            engine: kind,
            compiled: report.refreshed.len(),
            failed: report.failed.len(),
        });
        info!(
            "Rebuilt engine {}: {} refreshed, {} failed",
            kind,
            report.refreshed.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Adopt one output of a batch unless the artifact is up to date or was
    /// re-registered since `batched` was read. Caller holds the compile lock.
    async fn adopt_batch_output(
        &self,
        backend: Arc<dyn CompilerBackend>,
        batched: &ArtifactRecord,
        compiled: CompiledArtifact,
        compiled_from: Option<SystemTime>,
        started: Instant,
    ) -> ReloadResult<Option<Arc<Generation>>> {
        let key = &batched.key;
        let current = self.inner.loader.current(key);
        let record = match self.inner.registry.get(key) {
            Some(record)
                if record.incarnation == batched.incarnation
                    && (current.is_none() || record.tainted) =>
            {
                record
            }
            _ => {
                backend.discard(&compiled);
                remove_output(&compiled.output_dir).await;
                return Ok(None);
            }
        };

        let id = current
            .as_ref()
            .map(|g| g.id().next())
            .unwrap_or(GenerationId::FIRST);
        self.adopt(backend, &record, id, compiled, compiled_from, started)
            .await
            .map(Some)
    }

    /// Register every source under `source_root` the engine's backend
    /// handles. Returns the newly registered keys.
    pub async fn discover(
        &self,
        kind: EngineKind,
        source_root: impl AsRef<Path>,
    ) -> ReloadResult<Vec<ArtifactKey>> {
        let backend = self.backend(kind)?;
        let source_root = source_root.as_ref().to_path_buf();
        let sources = tokio::task::spawn_blocking({
            let root = source_root.clone();
            let extensions: Vec<&'static str> = backend.extensions().to_vec();
            move || discover_sources(&root, &extensions)
        })
        .await
        .map_err(|e| ReloadError::Internal(format!("discovery task failed: {}", e)))?;

        let mut registered = Vec::new();
        for relative in sources {
            let key = ArtifactKey::from_relative_path(&relative);
            let path = source_root.join(&relative);
            let inserted = self
                .register_artifact(
                    key.clone(),
                    source_root.clone(),
                    relative,
                    kind,
                    ArtifactType::default(),
                    Reloadability::Dynamic,
                )
                .await?;
            if inserted {
                registered.push(key);
            } else if let Some(existing) = self.inner.registry.get(&key) {
                if existing.source_path() != path {
                    warn!(
                        "Skipping {}: key {} already belongs to {}",
                        path.display(),
                        key,
                        existing.source_path().display()
                    );
                }
            }
        }
        debug!(
            "Discovered {} new {} artifact(s) under {}",
            registered.len(),
            kind,
            source_root.display()
        );
        Ok(registered)
    }

    /// Discover the source roots of every enabled engine in the configuration
    pub async fn discover_configured(&self) -> ReloadResult<Vec<ArtifactKey>> {
        let mut registered = Vec::new();
        let engines: Vec<(EngineKind, Vec<PathBuf>)> = self
            .inner
            .config
            .enabled_engines()
            .map(|e| (e.kind, e.source_roots.clone()))
            .collect();
        for (kind, roots) in engines {
            for root in roots {
                registered.extend(self.discover(kind, &root).await?);
            }
        }
        Ok(registered)
    }

    /// Diagnostics of the most recent compile of an engine
    pub fn last_diagnostics(&self, kind: EngineKind) -> Vec<Diagnostic> {
        self.inner
            .diagnostics
            .get(&kind)
            .map(|d| d.value().clone())
            .unwrap_or_default()
    }

    pub fn begin_request(&self) -> RequestContext {
        RequestContext::new()
    }

    /// Bind a new weaving handle for `key`
    pub async fn weave(&self, key: impl Into<ArtifactKey>) -> ReloadResult<Woven> {
        Woven::bind(self.clone(), key.into()).await
    }

    /// Instantiate the freshest definition without a weaving handle
    pub async fn instantiate(&self, key: &ArtifactKey) -> ReloadResult<crate::loader::Instance> {
        let binding = self.resolve(key).await?;
        binding.instantiate(key).map_err(ReloadError::from)
    }
}

async fn modified(path: &Path) -> std::io::Result<SystemTime> {
    tokio::fs::metadata(path).await?.modified()
}

async fn remove_output(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!("Could not remove output area {}: {}", dir.display(), e);
        }
    }
}

impl std::fmt::Debug for ReloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadEngine")
            .field("artifacts", &self.inner.registry.len())
            .field("generations", &self.inner.loader.len())
            .field("running", &self.is_running())
            .finish()
    }
}
