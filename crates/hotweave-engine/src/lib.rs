//! hotweave engine
//!
//! Runtime hot-reload of externally modifiable behavior: source files are
//! polled for changes, recompiled on demand by a per-kind compiler backend,
//! loaded as isolated generations and rebound behind weaving handles without
//! restarting the host.
//!
//! ```rust,ignore
//! use hotweave_engine::ReloadEngine;
//! use hotweave_kernel::{EngineKind, ReloadConfig};
//!
//! let engine = ReloadEngine::new(ReloadConfig::default())?;
//! engine.discover(EngineKind::Script, "./scripts").await?;
//! engine.start()?;
//!
//! let button = engine.weave("widgets.Button").await?;
//! let request = engine.begin_request();
//! let html = button.invoke(&request, "render", serde_json::json!({"label": "Ok"})).await?;
//! ```

pub mod backend;
pub mod daemon;
pub mod engine;
pub mod loader;
pub mod registry;
pub mod weaving;

pub use backend::{CompileAllReport, CompileUnit, CompiledArtifact, CompilerBackend};
pub use daemon::{ScanReport, StalenessDaemon};
pub use engine::{PurgedArtifact, RebuildReport, RefreshSummary, ReloadEngine, ReloadEngineBuilder};
pub use loader::{Binding, Generation, GenerationLoader, Instance};
pub use registry::{ArtifactRegistry, StatOutcome};
pub use weaving::{RequestContext, Woven};

pub use hotweave_kernel as kernel;
