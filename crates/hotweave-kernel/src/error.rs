//! Typed errors for the reload engine.
//!
//! Compile and load failures are kept distinct: a [`CompileError`] means the
//! source did not produce an output at all, a [`LoadError`] means an output
//! exists but could not be defined or instantiated.

use crate::artifact::{ArtifactKey, EngineKind};
use crate::config::ConfigError;
use crate::diagnostic::{Diagnostic, error_count};
use crate::extension::ExtensionError;
use std::path::PathBuf;
use thiserror::Error;

/// A source unit failed to compile. Carries every collected diagnostic.
#[derive(Debug, Clone, Error)]
#[error("Compile failed for {}: {} error(s)", .path.display(), error_count(.diagnostics))]
pub struct CompileError {
    /// Source file that failed
    pub path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    pub fn new(path: impl Into<PathBuf>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            path: path.into(),
            diagnostics,
        }
    }

    /// A failure described by a single error diagnostic
    pub fn single(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        let path = path.into();
        let diagnostic = Diagnostic::error(message).with_file(path.clone());
        Self::new(path, vec![diagnostic])
    }
}

/// Compiled output could not be defined, resolved or instantiated.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadError {
    #[error("Failed to load library: {0}")]
    Library(String),

    #[error("Symbol not found: {0}")]
    MissingSymbol(String),

    #[error("API version mismatch: expected {expected}, got {actual}")]
    ApiVersionMismatch { expected: u32, actual: u32 },

    #[error("Malformed output {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Instantiation failed: {0}")]
    Instantiation(String),

    #[error("No definition available for {0}")]
    NotFound(ArtifactKey),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error of the reload engine
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReloadError {
    #[error("Reading modification time failed for {}: {source}", .path.display())]
    FileStat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Artifact not registered: {0}")]
    UnknownArtifact(ArtifactKey),

    #[error("Artifact {0} became unavailable while it was being recompiled")]
    Unavailable(ArtifactKey),

    #[error("No compiler backend for engine {0}")]
    EngineDisabled(EngineKind),

    #[error("Extension error: {0}")]
    Extension(#[from] ExtensionError),

    #[error("Reload engine is shutting down")]
    ShutdownInterrupt,

    #[error("Engine already running")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReloadError {
    /// Expected during teardown, never reported as a failure
    pub fn is_shutdown(&self) -> bool {
        matches!(self, ReloadError::ShutdownInterrupt)
    }

    /// Diagnostics carried by a compile failure
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            ReloadError::Compile(err) => &err.diagnostics,
            _ => &[],
        }
    }
}

/// Result alias for reload engine operations
pub type ReloadResult<T> = Result<T, ReloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_message_counts_errors() {
        let err = CompileError::new(
            "src/Foo.rhai",
            vec![
                Diagnostic::error("unexpected token"),
                Diagnostic::warning("unused"),
            ],
        );
        assert_eq!(err.to_string(), "Compile failed for src/Foo.rhai: 1 error(s)");
    }

    #[test]
    fn test_reload_error_diagnostics() {
        let err: ReloadError = CompileError::single("Foo.rhai", "boom").into();
        assert_eq!(err.diagnostics().len(), 1);
        assert!(!err.is_shutdown());
        assert!(ReloadError::ShutdownInterrupt.is_shutdown());

        let load: ReloadError = LoadError::MissingSymbol("_hotweave_create".into()).into();
        assert!(load.diagnostics().is_empty());
        assert!(load.to_string().contains("_hotweave_create"));
    }
}
