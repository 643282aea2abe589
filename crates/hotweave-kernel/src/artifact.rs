//! Artifact model
//!
//! An artifact is one trackable unit of externally modifiable behavior: a
//! source file that the engine can recompile and rebind while the host keeps
//! running.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Stable logical name of an artifact (e.g. `widgets.Button`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// Create a key from any string-like value
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive a key from a path relative to a source root.
    ///
    /// `widgets/Button.rhai` becomes `widgets.Button`.
    pub fn from_relative_path(relative: &Path) -> Self {
        let stem = relative.with_extension("");
        let parts: Vec<String> = stem
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .filter(|c| !c.is_empty() && c != ".")
            .collect();
        Self(parts.join("."))
    }

    /// Borrow the key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A form of the key that is safe to use as a single path component
    pub fn to_path_component(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ArtifactKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Source kind. Each engine owns its own compiler backend and dirty flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Rhai scripts compiled into sandboxed ASTs
    Script,
    /// Rust sources compiled into shared libraries
    Native,
}

impl EngineKind {
    /// All engine kinds, in a stable order
    pub const ALL: [EngineKind; 2] = [EngineKind::Script, EngineKind::Native];

    /// Short lowercase name, also used for output directories
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Script => "script",
            EngineKind::Native => "native",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The hosting extension point an artifact implements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    #[default]
    Component,
    Renderer,
    RenderKit,
    Validator,
    Converter,
    ResourceHandler,
    Bean,
    Other(String),
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactType::Component => write!(f, "component"),
            ArtifactType::Renderer => write!(f, "renderer"),
            ArtifactType::RenderKit => write!(f, "render_kit"),
            ArtifactType::Validator => write!(f, "validator"),
            ArtifactType::Converter => write!(f, "converter"),
            ArtifactType::ResourceHandler => write!(f, "resource_handler"),
            ArtifactType::Bean => write!(f, "bean"),
            ArtifactType::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Whether an artifact participates in hot reloading.
///
/// Decided once at registration; indirections never re-derive it per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Reloadability {
    /// Resolved through normal process resolution only
    Static,
    /// Tracked, recompiled and rebound on change
    #[default]
    Dynamic,
}

/// Monotonically increasing version of one artifact's compiled definition.
///
/// The first successful compile of an artifact yields generation 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationId(u64);

impl GenerationId {
    /// The first generation of an artifact
    pub const FIRST: GenerationId = GenerationId(1);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The generation following this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Metadata tracked for every registered artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Stable logical name
    pub key: ArtifactKey,
    /// Root directory the artifact's source lives under
    pub source_root: PathBuf,
    /// Path of the source file relative to `source_root`
    pub file_name: PathBuf,
    /// Owning engine
    pub engine: EngineKind,
    /// Hosting extension point
    pub artifact_type: ArtifactType,
    /// Capability flag
    pub reloadability: Reloadability,
    /// Last modification time observed for the backing file
    pub last_modified: Option<SystemTime>,
    /// Backing source changed since the last successful load
    pub tainted: bool,
    /// Has ever been tainted; never resets
    pub tainted_once: bool,
    /// Last successfully published generation
    pub generation: Option<GenerationId>,
    /// Assigned by the registry on insert; a purged and re-registered key
    /// gets a new one
    #[serde(default)]
    pub incarnation: u64,
}

impl ArtifactRecord {
    /// Create a fresh, untainted record
    pub fn new(
        key: impl Into<ArtifactKey>,
        source_root: impl Into<PathBuf>,
        file_name: impl Into<PathBuf>,
        engine: EngineKind,
    ) -> Self {
        Self {
            key: key.into(),
            source_root: source_root.into(),
            file_name: file_name.into(),
            engine,
            artifact_type: ArtifactType::default(),
            reloadability: Reloadability::default(),
            last_modified: None,
            tainted: false,
            tainted_once: false,
            generation: None,
            incarnation: 0,
        }
    }

    pub fn with_artifact_type(mut self, artifact_type: ArtifactType) -> Self {
        self.artifact_type = artifact_type;
        self
    }

    pub fn with_reloadability(mut self, reloadability: Reloadability) -> Self {
        self.reloadability = reloadability;
        self
    }

    pub fn with_last_modified(mut self, last_modified: Option<SystemTime>) -> Self {
        self.last_modified = last_modified;
        self
    }

    /// Full path of the backing source file
    pub fn source_path(&self) -> PathBuf {
        self.source_root.join(&self.file_name)
    }

    pub fn is_dynamic(&self) -> bool {
        self.reloadability == Reloadability::Dynamic
    }
}
