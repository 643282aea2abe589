//! hotweave kernel
//!
//! Types shared by the reload engine and its collaborators:
//!
//! - the artifact model ([`ArtifactRecord`], [`ArtifactKey`], [`GenerationId`])
//! - the extension surface and native ABI ([`Extension`], [`declare_extension!`])
//! - compiler diagnostics and typed errors
//! - reload events
//! - configuration loading

pub mod artifact;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod event;
pub mod extension;

pub use artifact::{
    ArtifactKey, ArtifactRecord, ArtifactType, EngineKind, GenerationId, Reloadability,
};
pub use config::{Classpath, ConfigError, EngineConfig, ReloadConfig};
pub use diagnostic::{Diagnostic, Severity};
pub use error::{CompileError, LoadError, ReloadError, ReloadResult};
pub use event::ReloadEvent;
pub use extension::{Definition, Extension, ExtensionError, FnExtension, StaticDefinition};
