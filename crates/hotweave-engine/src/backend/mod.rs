//! Compiler backends
//!
//! One backend per engine kind. A backend turns a source file into an output
//! inside an isolated directory and later defines that output as a loadable
//! [`Definition`]. Backends are pluggable through [`CompilerBackend`].

mod native;
mod script;

pub use native::{NativeBackend, parse_rustc_diagnostics};
pub use script::ScriptBackend;

use async_trait::async_trait;
use hotweave_kernel::{Classpath, CompileError, Definition, Diagnostic, EngineKind, LoadError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One source file to compile
#[derive(Debug, Clone, Copy)]
pub struct CompileUnit<'a> {
    pub source_root: &'a Path,
    pub classpath: &'a Classpath,
    /// Source file relative to `source_root`
    pub relative_path: &'a Path,
    /// Fresh directory owned by the generation being built
    pub output_dir: &'a Path,
}

impl CompileUnit<'_> {
    pub fn source_path(&self) -> PathBuf {
        self.source_root.join(self.relative_path)
    }
}

/// Output of a successful compile
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    /// Directory holding everything the compile produced
    pub output_dir: PathBuf,
    /// The file handed to [`CompilerBackend::define`]
    pub output: PathBuf,
    /// Non-fatal diagnostics
    pub warnings: Vec<Diagnostic>,
}

/// Result of compiling a whole source root
#[derive(Debug, Default)]
pub struct CompileAllReport {
    /// Compiled units keyed by path relative to the source root
    pub compiled: Vec<(PathBuf, CompiledArtifact)>,
    pub failed: Vec<CompileError>,
}

impl CompileAllReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Every diagnostic of the batch, warnings included
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut all: Vec<Diagnostic> = self
            .compiled
            .iter()
            .flat_map(|(_, c)| c.warnings.iter().cloned())
            .collect();
        all.extend(self.failed.iter().flat_map(|f| f.diagnostics.iter().cloned()));
        all
    }
}

/// Compiler backend for one engine kind
#[async_trait]
pub trait CompilerBackend: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// File extensions (without dot) this backend compiles
    fn extensions(&self) -> &[&'static str];

    /// Compile one unit into `unit.output_dir`
    async fn compile(&self, unit: CompileUnit<'_>) -> Result<CompiledArtifact, CompileError>;

    /// Load a compiled output. May block; callers run it off the async workers.
    fn define(&self, output: &Path) -> Result<Arc<dyn Definition>, LoadError>;

    /// Forget a compiled output that will never be defined
    fn discard(&self, _compiled: &CompiledArtifact) {}

    /// Compile every source under `source_root`. Each unit gets its own
    /// directory under `output_root`.
    async fn compile_all(
        &self,
        source_root: &Path,
        classpath: &Classpath,
        output_root: &Path,
    ) -> CompileAllReport {
        let mut report = CompileAllReport::default();

        for relative in discover_sources(source_root, self.extensions()) {
            let output_dir = unit_output_dir(output_root, &relative);
            if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
                report.failed.push(CompileError::single(
                    source_root.join(&relative),
                    format!("cannot create output directory {}: {}", output_dir.display(), e),
                ));
                continue;
            }

            let unit = CompileUnit {
                source_root,
                classpath,
                relative_path: &relative,
                output_dir: &output_dir,
            };
            match self.compile(unit).await {
                Ok(compiled) => report.compiled.push((relative, compiled)),
                Err(e) => {
                    warn!("{}", e);
                    report.failed.push(e);
                }
            }
        }

        debug!(
            "Compiled {} unit(s) under {}, {} failed",
            report.compiled.len(),
            source_root.display(),
            report.failed.len()
        );
        report
    }
}

/// Output directory of one unit inside a batch
pub fn unit_output_dir(output_root: &Path, relative: &Path) -> PathBuf {
    output_root.join(relative.with_extension(""))
}

/// Source files under `root` with one of `extensions`, relative to `root`
/// and sorted. Hidden entries are skipped.
pub fn discover_sources(root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| extensions.contains(&x))
        })
        .filter_map(|e| e.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    found.sort();
    found
}
