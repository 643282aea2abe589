//! Native backend
//!
//! Compiles a single `.rs` source into a `cdylib` with `rustc` and loads it
//! with libloading. The library must export the entry points generated by
//! `hotweave_kernel::declare_extension!`.
//!
//! Instances cross the library boundary as `*mut dyn Extension`, so the
//! library has to be built by the same compiler against the same
//! `hotweave-kernel` as the host; pass it through the engine classpath.

use super::{CompileUnit, CompiledArtifact, CompilerBackend};
use async_trait::async_trait;
use hotweave_kernel::config::NativeToolchain;
use hotweave_kernel::extension::{
    API_VERSION, API_VERSION_SYMBOL, ApiVersionFn, CREATE_SYMBOL, CreateFn, DESTROY_SYMBOL,
    DestroyFn,
};
use hotweave_kernel::{
    CompileError, Definition, Diagnostic, EngineKind, Extension, ExtensionError, LoadError,
    Severity,
};
use libloading::Library;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

const EXTENSIONS: &[&str] = &["rs"];

/// rustc-driven backend for native artifacts
pub struct NativeBackend {
    toolchain: NativeToolchain,
}

impl NativeBackend {
    pub fn new(toolchain: NativeToolchain) -> Self {
        Self { toolchain }
    }

    fn command(&self, unit: &CompileUnit<'_>, crate_name: &str, output: &Path) -> Command {
        let mut cmd = Command::new(&self.toolchain.rustc);
        cmd.arg(unit.source_path())
            .arg("--crate-type=cdylib")
            .arg("--crate-name")
            .arg(crate_name)
            .arg(format!("--edition={}", self.toolchain.edition))
            .arg("--error-format=json")
            .arg("-C")
            .arg(format!("opt-level={}", self.toolchain.opt_level))
            .arg("-o")
            .arg(output);
        for path in &unit.classpath.search_paths {
            cmd.arg("-L").arg(path);
        }
        for ext in &unit.classpath.externs {
            cmd.arg("--extern")
                .arg(format!("{}={}", ext.name, ext.path.display()));
        }
        cmd.args(&self.toolchain.extra_args);
        cmd.kill_on_drop(true);
        cmd
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new(NativeToolchain::default())
    }
}

/// Crate name derived from a source path: `widgets/Button.rs` -> `widgets_button`
pub fn crate_name_for(relative: &Path) -> String {
    let stem = relative.with_extension("");
    let name: String = stem
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    match name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => name,
        _ => format!("artifact_{}", name),
    }
}

/// Platform file name of a dynamic library
pub fn library_file_name(crate_name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.dll", crate_name)
    } else if cfg!(target_os = "macos") {
        format!("lib{}.dylib", crate_name)
    } else {
        format!("lib{}.so", crate_name)
    }
}

#[derive(Deserialize)]
struct RustcMessage {
    #[serde(rename = "$message_type")]
    message_type: Option<String>,
    message: String,
    code: Option<RustcCode>,
    level: String,
    #[serde(default)]
    spans: Vec<RustcSpan>,
}

#[derive(Deserialize)]
struct RustcCode {
    code: String,
}

#[derive(Deserialize)]
struct RustcSpan {
    file_name: String,
    line_start: u32,
    column_start: u32,
    is_primary: bool,
}

/// Parse rustc's `--error-format=json` stderr into diagnostics.
///
/// Non-JSON lines, artifact notifications and the trailing
/// "aborting due to" summary are dropped.
pub fn parse_rustc_diagnostics(stderr: &str) -> Vec<Diagnostic> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<RustcMessage>(line).ok())
        .filter(|m| m.message_type.as_deref().is_none_or(|t| t == "diagnostic"))
        .filter(|m| m.level != "failure-note" && !m.message.starts_with("aborting due to"))
        .map(|m| {
            let severity = match m.level.as_str() {
                "warning" => Severity::Warning,
                "note" | "help" => Severity::Note,
                _ => Severity::Error,
            };
            let mut diagnostic = Diagnostic {
                severity,
                message: m.message,
                code: m.code.map(|c| c.code),
                file: None,
                line: None,
                column: None,
            };
            if let Some(span) = m.spans.iter().find(|s| s.is_primary).or(m.spans.first()) {
                diagnostic = diagnostic
                    .with_file(&span.file_name)
                    .at(span.line_start, span.column_start);
            }
            diagnostic
        })
        .collect()
}

#[async_trait]
impl CompilerBackend for NativeBackend {
    fn kind(&self) -> EngineKind {
        EngineKind::Native
    }

    fn extensions(&self) -> &[&'static str] {
        EXTENSIONS
    }

    async fn compile(&self, unit: CompileUnit<'_>) -> Result<CompiledArtifact, CompileError> {
        let source_path = unit.source_path();
        let crate_name = crate_name_for(unit.relative_path);
        let output = unit.output_dir.join(library_file_name(&crate_name));

        debug!("Running {} for {}", self.toolchain.rustc.display(), source_path.display());
        let result = self
            .command(&unit, &crate_name, &output)
            .output()
            .await
            .map_err(|e| {
                CompileError::single(
                    &source_path,
                    format!("failed to run {}: {}", self.toolchain.rustc.display(), e),
                )
            })?;

        let mut diagnostics = parse_rustc_diagnostics(&String::from_utf8_lossy(&result.stderr));
        if !result.status.success() || diagnostics.iter().any(Diagnostic::is_error) {
            if !diagnostics.iter().any(Diagnostic::is_error) {
                diagnostics.push(
                    Diagnostic::error(format!("rustc exited with {}", result.status))
                        .with_file(&source_path),
                );
            }
            return Err(CompileError::new(source_path, diagnostics));
        }
        if !output.exists() {
            return Err(CompileError::single(
                source_path,
                format!("rustc reported success but {} is missing", output.display()),
            ));
        }

        info!("Compiled native artifact {}", output.display());
        Ok(CompiledArtifact {
            output_dir: unit.output_dir.to_path_buf(),
            output,
            warnings: diagnostics,
        })
    }

    fn define(&self, output: &Path) -> Result<Arc<dyn Definition>, LoadError> {
        Ok(Arc::new(NativeDefinition::load(output)?))
    }
}

/// A loaded native library and its entry points
pub struct NativeDefinition {
    path: PathBuf,
    create: CreateFn,
    destroy: DestroyFn,
    library: Arc<Library>,
}

impl NativeDefinition {
    /// Load a library and resolve its entry points.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        info!("Loading native library: {:?}", path);
        // SAFETY: running library initializers is inherent to native loading
        let library = unsafe { Library::new(path) }
            .map_err(|e| LoadError::Library(format!("{}: {}", path.display(), e)))?;

        // SAFETY: symbol types are fixed by the declare_extension! macro
        unsafe {
            let api_version = library
                .get::<ApiVersionFn>(API_VERSION_SYMBOL)
                .map_err(|e| LoadError::MissingSymbol(format!("_hotweave_api_version: {}", e)))?;
            let actual = api_version();
            if actual != API_VERSION {
                return Err(LoadError::ApiVersionMismatch {
                    expected: API_VERSION,
                    actual,
                });
            }

            let create = *library
                .get::<CreateFn>(CREATE_SYMBOL)
                .map_err(|e| LoadError::MissingSymbol(format!("_hotweave_create: {}", e)))?;
            let destroy = *library
                .get::<DestroyFn>(DESTROY_SYMBOL)
                .map_err(|e| LoadError::MissingSymbol(format!("_hotweave_destroy: {}", e)))?;

            Ok(Self {
                path: path.to_path_buf(),
                create,
                destroy,
                library: Arc::new(library),
            })
        }
    }
}

impl Definition for NativeDefinition {
    fn instantiate(&self) -> Result<Box<dyn Extension>, LoadError> {
        // SAFETY: the library is kept alive by the instance
        let raw = unsafe { (self.create)() };
        if raw.is_null() {
            return Err(LoadError::Instantiation(format!(
                "{} returned a null instance",
                self.path.display()
            )));
        }
        Ok(Box::new(NativeInstance {
            raw,
            destroy: self.destroy,
            _library: self.library.clone(),
        }))
    }
}

impl Drop for NativeDefinition {
    fn drop(&mut self) {
        debug!("Releasing native definition: {:?}", self.path);
    }
}

/// Instance created by a native library. Destroyed through the library's
/// own destroy entry point so the allocation is freed by its allocator.
struct NativeInstance {
    raw: *mut dyn Extension,
    destroy: DestroyFn,
    // dropped after `drop` runs, so the code stays mapped until destroy returns
    _library: Arc<Library>,
}

// SAFETY: the pointee is `dyn Extension`, which is Send + Sync
unsafe impl Send for NativeInstance {}
unsafe impl Sync for NativeInstance {}

impl Extension for NativeInstance {
    fn invoke(&self, operation: &str, input: Value) -> Result<Value, ExtensionError> {
        // SAFETY: raw is non-null and owned by this instance until drop
        unsafe { (*self.raw).invoke(operation, input) }
    }
}

impl Drop for NativeInstance {
    fn drop(&mut self) {
        // SAFETY: raw came from the matching create entry point
        unsafe { (self.destroy)(self.raw) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_name_for() {
        assert_eq!(crate_name_for(Path::new("widgets/Button.rs")), "widgets_button");
        assert_eq!(crate_name_for(Path::new("Foo.rs")), "foo");
        assert_eq!(crate_name_for(Path::new("9lives.rs")), "artifact_9lives");
    }

    #[test]
    fn test_library_file_name() {
        let name = library_file_name("foo");
        assert!(name.contains("foo"));
        if cfg!(target_os = "linux") {
            assert_eq!(name, "libfoo.so");
        }
    }

    #[test]
    fn test_parse_rustc_diagnostics() {
        let stderr = r#"{"$message_type":"diagnostic","message":"cannot find value `x` in this scope","code":{"code":"E0425","explanation":null},"level":"error","spans":[{"file_name":"src/Foo.rs","byte_start":10,"byte_end":11,"line_start":3,"line_end":3,"column_start":9,"column_end":10,"is_primary":true,"text":[],"label":null,"suggested_replacement":null,"suggestion_applicability":null,"expansion":null}],"children":[],"rendered":"error[E0425]"}
{"$message_type":"diagnostic","message":"unused variable: `y`","code":{"code":"unused_variables","explanation":null},"level":"warning","spans":[{"file_name":"src/Foo.rs","byte_start":0,"byte_end":1,"line_start":2,"line_end":2,"column_start":5,"column_end":6,"is_primary":true,"text":[],"label":null,"suggested_replacement":null,"suggestion_applicability":null,"expansion":null}],"children":[],"rendered":"warning"}
{"$message_type":"diagnostic","message":"aborting due to 1 previous error","code":null,"level":"error","spans":[],"children":[],"rendered":"error: aborting"}
{"$message_type":"diagnostic","message":"For more information about this error, try `rustc --explain E0425`.","code":null,"level":"failure-note","spans":[],"children":[],"rendered":""}
{"$message_type":"artifact","artifact":"/tmp/libfoo.so","emit":"link"}
not json at all"#;

        let diagnostics = parse_rustc_diagnostics(stderr);
        assert_eq!(diagnostics.len(), 2);

        let error = &diagnostics[0];
        assert!(error.is_error());
        assert_eq!(error.code.as_deref(), Some("E0425"));
        assert_eq!(error.file.as_deref(), Some(Path::new("src/Foo.rs")));
        assert_eq!((error.line, error.column), (Some(3), Some(9)));

        assert_eq!(diagnostics[1].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_missing_toolchain_is_compile_error() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("Foo.rs"), "pub fn f() {}").unwrap();
        let backend = NativeBackend::new(NativeToolchain {
            rustc: dir.path().join("no-such-rustc"),
            ..NativeToolchain::default()
        });

        let classpath = hotweave_kernel::Classpath::new();
        let err = backend
            .compile(CompileUnit {
                source_root: dir.path(),
                classpath: &classpath,
                relative_path: Path::new("Foo.rs"),
                output_dir: dir.path(),
            })
            .await
            .unwrap_err();
        assert!(err.diagnostics[0].message.contains("failed to run"));
    }

    #[test]
    fn test_define_rejects_non_library() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("libfake.so");
        std::fs::write(&path, b"not a library").unwrap();
        assert!(matches!(
            NativeBackend::default().define(&path),
            Err(LoadError::Library(_))
        ));
    }
}
