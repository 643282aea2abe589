//! Reload events broadcast to collaborators

use crate::artifact::{ArtifactKey, EngineKind, GenerationId};
use crate::diagnostic::Diagnostic;
use std::path::PathBuf;
use std::time::Duration;

/// Reload engine event
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ReloadEvent {
    /// An artifact was registered for the first time
    Registered {
        key: ArtifactKey,
        engine: EngineKind,
        path: PathBuf,
    },
    /// The daemon detected a change in an artifact's backing file
    Tainted { key: ArtifactKey, engine: EngineKind },
    /// An engine went from clean to dirty; full-engine scanners should rescan
    EngineDirty { engine: EngineKind },
    /// A recompile started
    CompileStarted { key: ArtifactKey, engine: EngineKind },
    /// A new generation was published
    Recompiled {
        key: ArtifactKey,
        generation: GenerationId,
        duration: Duration,
        warnings: Vec<Diagnostic>,
    },
    /// A recompile failed; the previous generation keeps serving
    CompileFailed {
        key: ArtifactKey,
        engine: EngineKind,
        diagnostics: Vec<Diagnostic>,
    },
    /// Compiled output could not be loaded
    LoadFailed { key: ArtifactKey, error: String },
    /// A full-engine rebuild finished
    EngineRebuilt {
        engine: EngineKind,
        compiled: usize,
        failed: usize,
    },
    /// An artifact was purged after its source disappeared
    Purged {
        key: ArtifactKey,
        last_generation: Option<GenerationId>,
    },
}

impl ReloadEvent {
    /// Artifact the event concerns, if any
    pub fn key(&self) -> Option<&ArtifactKey> {
        match self {
            ReloadEvent::Registered { key, .. }
            | ReloadEvent::Tainted { key, .. }
            | ReloadEvent::CompileStarted { key, .. }
            | ReloadEvent::Recompiled { key, .. }
            | ReloadEvent::CompileFailed { key, .. }
            | ReloadEvent::LoadFailed { key, .. }
            | ReloadEvent::Purged { key, .. } => Some(key),
            ReloadEvent::EngineDirty { .. } | ReloadEvent::EngineRebuilt { .. } => None,
        }
    }

    /// Diagnostics carried by the event
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            ReloadEvent::Recompiled { warnings, .. } => warnings,
            ReloadEvent::CompileFailed { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}
