//! Generation-isolated loader
//!
//! Each successful recompile produces a [`Generation`]: an isolated output
//! area plus the definition loaded from it. The loader keeps the current
//! generation per artifact. Older generations stay alive for as long as any
//! [`Instance`] created from them does, and their output area is reclaimed
//! once the last reference is gone.

use crate::backend::{CompiledArtifact, CompilerBackend};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hotweave_kernel::{
    ArtifactKey, Definition, EngineKind, Extension, ExtensionError, GenerationId, LoadError,
    StaticDefinition,
};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

/// One loaded version of an artifact
pub struct Generation {
    key: ArtifactKey,
    id: GenerationId,
    engine: EngineKind,
    output_dir: PathBuf,
    definition: Arc<dyn Definition>,
    loaded_at: SystemTime,
    reclaim: bool,
}

impl Generation {
    pub fn new(
        key: ArtifactKey,
        id: GenerationId,
        engine: EngineKind,
        output_dir: PathBuf,
        definition: Arc<dyn Definition>,
    ) -> Self {
        Self {
            key,
            id,
            engine,
            output_dir,
            definition,
            loaded_at: SystemTime::now(),
            reclaim: false,
        }
    }

    /// Delete the output area when the generation is dropped
    pub fn with_reclaim(mut self, reclaim: bool) -> Self {
        self.reclaim = reclaim;
        self
    }

    /// Define a compiled artifact as a new generation.
    ///
    /// Blocking: loads code from disk.
    pub fn define(
        backend: &dyn CompilerBackend,
        key: ArtifactKey,
        id: GenerationId,
        compiled: &CompiledArtifact,
    ) -> Result<Self, LoadError> {
        let definition = backend.define(&compiled.output)?;
        Ok(Self::new(
            key,
            id,
            backend.kind(),
            compiled.output_dir.clone(),
            definition,
        ))
    }

    pub fn key(&self) -> &ArtifactKey {
        &self.key
    }

    pub fn id(&self) -> GenerationId {
        self.id
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create an instance pinned to this generation
    pub fn instantiate(self: &Arc<Self>) -> Result<Instance, LoadError> {
        let inner = self.definition.instantiate()?;
        Ok(Instance {
            inner,
            key: self.key.clone(),
            generation: Some(self.clone()),
        })
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generation")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("engine", &self.engine)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl Drop for Generation {
    fn drop(&mut self) {
        let age = self.loaded_at.elapsed().unwrap_or_default();
        debug!("Releasing generation {} of {} after {:?}", self.id, self.key, age);
        if self.reclaim {
            if let Err(e) = std::fs::remove_dir_all(&self.output_dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "Failed to reclaim output area {}: {}",
                        self.output_dir.display(),
                        e
                    );
                }
            }
        }
    }
}

/// What a name currently resolves to
#[derive(Clone)]
pub enum Binding {
    /// A dynamically loaded generation
    Generation(Arc<Generation>),
    /// Normal process resolution
    Static(StaticDefinition),
}

impl Binding {
    /// Generation id, `None` for static definitions
    pub fn generation_id(&self) -> Option<GenerationId> {
        match self {
            Binding::Generation(g) => Some(g.id()),
            Binding::Static(_) => None,
        }
    }

    pub fn instantiate(&self, key: &ArtifactKey) -> Result<Instance, LoadError> {
        match self {
            Binding::Generation(g) => g.instantiate(),
            Binding::Static(definition) => Ok(Instance {
                inner: definition.instantiate()?,
                key: key.clone(),
                generation: None,
            }),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Generation(g) => f.debug_tuple("Generation").field(&g.id()).finish(),
            Binding::Static(_) => f.write_str("Static"),
        }
    }
}

/// A live artifact instance.
pub struct Instance {
    // must drop before `generation`, which keeps the defining code loaded
    inner: Box<dyn Extension>,
    key: ArtifactKey,
    generation: Option<Arc<Generation>>,
}

impl Instance {
    pub fn key(&self) -> &ArtifactKey {
        &self.key
    }

    /// Generation the instance was created from; `None` when static
    pub fn generation_id(&self) -> Option<GenerationId> {
        self.generation.as_ref().map(|g| g.id())
    }

    pub fn invoke(&self, operation: &str, input: Value) -> Result<Value, ExtensionError> {
        self.inner.invoke(operation, input)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("key", &self.key)
            .field("generation", &self.generation_id())
            .finish()
    }
}

/// Index of current generations plus statically compiled definitions
#[derive(Default)]
pub struct GenerationLoader {
    current: DashMap<ArtifactKey, Arc<Generation>>,
    statics: DashMap<ArtifactKey, StaticDefinition>,
}

impl GenerationLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation of an artifact
    pub fn current(&self, key: &ArtifactKey) -> Option<Arc<Generation>> {
        self.current.get(key).map(|g| g.value().clone())
    }

    pub fn current_id(&self, key: &ArtifactKey) -> Option<GenerationId> {
        self.current.get(key).map(|g| g.id())
    }

    /// Make `generation` current. A generation older than or equal to the
    /// current one is refused and the current one is returned instead.
    pub fn publish(&self, generation: Generation) -> Arc<Generation> {
        match self.current.entry(generation.key().clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().id() >= generation.id() {
                    warn!(
                        "Refusing to publish {} of {}: {} is current",
                        generation.id(),
                        generation.key(),
                        slot.get().id()
                    );
                    return slot.get().clone();
                }
                let generation = Arc::new(generation);
                slot.insert(generation.clone());
                generation
            }
            Entry::Vacant(slot) => {
                let generation = Arc::new(generation);
                slot.insert(generation.clone());
                generation
            }
        }
    }

    /// Drop the index entry; live instances keep the generation alive
    pub fn evict(&self, key: &ArtifactKey) -> Option<Arc<Generation>> {
        self.current.remove(key).map(|(_, g)| g)
    }

    /// Evict `generation` only if it is still the current one
    pub fn retract(&self, generation: &Arc<Generation>) -> bool {
        self.current
            .remove_if(generation.key(), |_, current| Arc::ptr_eq(current, generation))
            .is_some()
    }

    pub fn register_static(&self, key: ArtifactKey, definition: StaticDefinition) {
        self.statics.insert(key, definition);
    }

    pub fn static_definition(&self, key: &ArtifactKey) -> Option<StaticDefinition> {
        self.statics.get(key).map(|d| d.value().clone())
    }

    /// Resolve a name: current generation first, then the static definition
    pub fn resolve(&self, key: &ArtifactKey) -> Result<Binding, LoadError> {
        if let Some(generation) = self.current(key) {
            return Ok(Binding::Generation(generation));
        }
        self.static_definition(key)
            .map(Binding::Static)
            .ok_or_else(|| LoadError::NotFound(key.clone()))
    }

    /// Number of artifacts with a current generation
    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotweave_kernel::FnExtension;
    use serde_json::json;
    use tempfile::TempDir;

    struct Tagged(&'static str);

    impl Definition for Tagged {
        fn instantiate(&self) -> Result<Box<dyn Extension>, LoadError> {
            let tag = self.0;
            Ok(Box::new(FnExtension::new(move |_, _| Ok(json!(tag)))))
        }
    }

    fn generation(key: &str, id: u64, dir: PathBuf, tag: &'static str) -> Generation {
        Generation::new(
            key.into(),
            GenerationId::new(id),
            EngineKind::Script,
            dir,
            Arc::new(Tagged(tag)),
        )
    }

    #[test]
    fn test_resolve_prefers_generation_over_static() {
        let loader = GenerationLoader::new();
        let key = ArtifactKey::new("Foo");
        assert!(matches!(loader.resolve(&key), Err(LoadError::NotFound(_))));

        loader.register_static(
            key.clone(),
            StaticDefinition::new(|| Box::new(FnExtension::new(|_, _| Ok(json!("static"))))),
        );
        let binding = loader.resolve(&key).unwrap();
        assert_eq!(binding.generation_id(), None);
        let instance = binding.instantiate(&key).unwrap();
        assert_eq!(instance.invoke("x", Value::Null).unwrap(), json!("static"));

        loader.publish(generation("Foo", 1, PathBuf::from("/nonexistent"), "g1"));
        let binding = loader.resolve(&key).unwrap();
        assert_eq!(binding.generation_id(), Some(GenerationId::FIRST));
    }

    #[test]
    fn test_publish_replaces_and_refuses_stale() {
        let loader = GenerationLoader::new();
        let g1 = loader.publish(generation("Foo", 1, PathBuf::from("/a"), "g1"));
        let g2 = loader.publish(generation("Foo", 2, PathBuf::from("/b"), "g2"));
        assert_eq!(g2.id().get(), 2);
        assert_eq!(loader.current_id(&"Foo".into()), Some(GenerationId::new(2)));

        let refused = loader.publish(generation("Foo", 2, PathBuf::from("/c"), "dup"));
        assert!(Arc::ptr_eq(&refused, &g2));
        drop(g1);
    }

    #[test]
    fn test_retract_only_removes_matching_generation() {
        let loader = GenerationLoader::new();
        let g1 = loader.publish(generation("Foo", 1, PathBuf::from("/a"), "g1"));
        let g2 = loader.publish(generation("Foo", 2, PathBuf::from("/b"), "g2"));

        assert!(!loader.retract(&g1));
        assert_eq!(loader.current_id(&"Foo".into()), Some(GenerationId::new(2)));
        assert!(loader.retract(&g2));
        assert!(loader.current(&"Foo".into()).is_none());
    }

    #[test]
    fn test_old_generation_outlives_index_while_instances_exist() {
        let dir = TempDir::new().unwrap();
        let area = dir.path().join("gen-1");
        std::fs::create_dir_all(&area).unwrap();

        let loader = GenerationLoader::new();
        let g1 = loader.publish(generation("Foo", 1, area.clone(), "g1").with_reclaim(true));
        let old = g1.instantiate().unwrap();
        drop(g1);

        let other = dir.path().join("gen-2");
        std::fs::create_dir_all(&other).unwrap();
        loader.publish(generation("Foo", 2, other, "g2").with_reclaim(true));

        // superseded but still referenced
        assert!(area.exists());
        assert_eq!(old.invoke("x", Value::Null).unwrap(), json!("g1"));
        assert_eq!(old.generation_id(), Some(GenerationId::FIRST));

        drop(old);
        assert!(!area.exists());
    }

    #[test]
    fn test_evict_keeps_outputs_without_reclaim() {
        let dir = TempDir::new().unwrap();
        let loader = GenerationLoader::new();
        loader.publish(generation("Foo", 1, dir.path().to_path_buf(), "g1"));
        let evicted = loader.evict(&"Foo".into()).unwrap();
        assert!(loader.is_empty());
        drop(evicted);
        assert!(dir.path().exists());
    }
}
