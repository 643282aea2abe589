//! Reload engine configuration
//!
//! Configuration is read through the `config` crate:
//!
//! - Format auto-detected from the file extension (TOML, YAML, JSON)
//! - Environment variable substitution inside the file (`${VAR}` and `$VAR`)
//! - `HOTWEAVE__*` environment overrides on top of the file
//!
//! ```toml
//! poll_interval_ms = 500
//! output_root = "/var/tmp/hotweave"
//!
//! [[engines]]
//! kind = "script"
//! source_roots = ["${APP_HOME}/scripts"]
//!
//! [[engines]]
//! kind = "native"
//! source_roots = ["./native"]
//! classpath = { externs = [{ name = "hotweave_kernel", path = "target/debug/libhotweave_kernel.rlib" }] }
//! ```

use crate::artifact::EngineKind;
use config::{Config as Cfg, Environment, File, FileFormat};
use error_stack::Report;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

#[cfg(test)]
mod tests;

/// Prefix of environment overrides (`HOTWEAVE__POLL_INTERVAL_MS=250`)
pub const ENV_PREFIX: &str = "HOTWEAVE";

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A crate passed to the native compiler with `--extern`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternCrate {
    pub name: String,
    pub path: PathBuf,
}

/// Dependency specification handed to a compiler backend.
///
/// Search paths become `-L` arguments for the native compiler and module
/// resolution roots for scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Classpath {
    pub search_paths: Vec<PathBuf>,
    pub externs: Vec<ExternCrate>,
}

impl Classpath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_extern(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.externs.push(ExternCrate {
            name: name.to_string(),
            path: path.into(),
        });
        self
    }
}

/// Per-engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub kind: EngineKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub source_roots: Vec<PathBuf>,
    #[serde(default)]
    pub classpath: Classpath,
}

impl EngineConfig {
    pub fn new(kind: EngineKind) -> Self {
        Self {
            kind,
            enabled: true,
            source_roots: Vec::new(),
            classpath: Classpath::default(),
        }
    }

    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_roots.push(root.into());
        self
    }

    pub fn with_classpath(mut self, classpath: Classpath) -> Self {
        self.classpath = classpath;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Native toolchain settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeToolchain {
    /// Compiler executable
    pub rustc: PathBuf,
    pub edition: String,
    pub opt_level: String,
    /// Extra arguments appended to every invocation
    pub extra_args: Vec<String>,
}

impl Default for NativeToolchain {
    fn default() -> Self {
        Self {
            rustc: PathBuf::from("rustc"),
            edition: "2021".to_string(),
            opt_level: "0".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Sandbox limits for script artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 64,
            max_string_size: 1_000_000,
            max_array_size: 10_000,
            max_map_size: 10_000,
        }
    }
}

/// Reload engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Staleness daemon poll interval
    pub poll_interval_ms: u64,
    /// Root of the per-generation output areas
    pub output_root: PathBuf,
    pub engines: Vec<EngineConfig>,
    /// Number of tainted artifacts at which a dirty engine is rebuilt as a whole
    pub full_rebuild_threshold: usize,
    /// Delete a generation's output area once nothing references it
    pub reclaim_outputs: bool,
    /// Capacity of the reload event channel
    pub event_capacity: usize,
    pub native: NativeToolchain,
    pub script: ScriptLimits,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            output_root: std::env::temp_dir().join("hotweave"),
            engines: vec![
                EngineConfig::new(EngineKind::Script),
                EngineConfig::new(EngineKind::Native),
            ],
            full_rebuild_threshold: 8,
            reclaim_outputs: true,
            event_capacity: 1024,
            native: NativeToolchain::default(),
            script: ScriptLimits::default(),
        }
    }
}

impl ReloadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a file, applying env substitution and `HOTWEAVE__*` overrides
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let config: ReloadConfig = load_with_env(path, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    /// Replace the engine list
    pub fn with_engines(mut self, engines: Vec<EngineConfig>) -> Self {
        self.engines = engines;
        self
    }

    /// Add or replace the settings of one engine
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engines.retain(|e| e.kind != engine.kind);
        self.engines.push(engine);
        self
    }

    pub fn with_full_rebuild_threshold(mut self, threshold: usize) -> Self {
        self.full_rebuild_threshold = threshold;
        self
    }

    pub fn with_reclaim_outputs(mut self, enabled: bool) -> Self {
        self.reclaim_outputs = enabled;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn engine(&self, kind: EngineKind) -> Option<&EngineConfig> {
        self.engines.iter().find(|e| e.kind == kind)
    }

    pub fn is_enabled(&self, kind: EngineKind) -> bool {
        self.engine(kind).is_some_and(|e| e.enabled)
    }

    pub fn enabled_engines(&self) -> impl Iterator<Item = &EngineConfig> {
        self.engines.iter().filter(|e| e.enabled)
    }

    /// Classpath of an engine, empty when the engine is not configured
    pub fn classpath(&self, kind: EngineKind) -> Classpath {
        self.engine(kind)
            .map(|e| e.classpath.clone())
            .unwrap_or_default()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.full_rebuild_threshold == 0 {
            return Err(ConfigError::Invalid(
                "full_rebuild_threshold must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for engine in &self.engines {
            if !seen.insert(engine.kind) {
                return Err(ConfigError::Invalid(format!(
                    "engine {} configured more than once",
                    engine.kind
                )));
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

/// Detect configuration format from file extension
pub fn detect_format(path: &Path) -> ConfigResult<FileFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

static BRACED_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));
static SIMPLE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("valid regex"));

/// Substitute environment variables in a string.
///
/// Unset variables are left untouched.
pub fn substitute_env_vars(content: &str) -> String {
    let braced = BRACED_VAR.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    SIMPLE_VAR
        .replace_all(&braced, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Parse configuration content with an explicit format
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted = substitute_env_vars(content);

    let config = Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load a file with environment overrides.
///
/// Overrides use the prefix and `__` for nesting: `HOTWEAVE__NATIVE__RUSTC`.
pub fn load_with_env<T>(path: &Path, env_prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content);

    let config = Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .add_source(
            Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load a [`ReloadConfig`], attaching the file path to the error report
pub fn load_config_report(path: impl AsRef<Path>) -> Result<ReloadConfig, Report<ConfigError>> {
    let path = path.as_ref();
    ReloadConfig::from_file(path)
        .map_err(|e| Report::new(e).attach(format!("loading {}", path.display())))
}
