//! Weaving indirection
//!
//! A [`Woven`] stands in for one hosting-visible extension point. Before each
//! call it checks whether a newer generation of its artifact is available and
//! rebinds if so. A [`RequestContext`] pins the instance used for each
//! artifact within one logical request.

use crate::engine::ReloadEngine;
use crate::loader::Instance;
use hotweave_kernel::{ArtifactKey, GenerationId, ReloadResult};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-request rebind guard
#[derive(Debug)]
pub struct RequestContext {
    id: Uuid,
    bound: Mutex<HashMap<ArtifactKey, Arc<Instance>>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            bound: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Instance already bound for `key` in this request
    pub fn bound(&self, key: &ArtifactKey) -> Option<Arc<Instance>> {
        self.bound.lock().get(key).cloned()
    }

    pub fn is_bound(&self, key: &ArtifactKey) -> bool {
        self.bound.lock().contains_key(key)
    }

    /// Record a binding. The first binding for a key wins and is returned.
    pub fn bind(&self, key: ArtifactKey, instance: Arc<Instance>) -> Arc<Instance> {
        self.bound.lock().entry(key).or_insert(instance).clone()
    }

    pub fn generation_of(&self, key: &ArtifactKey) -> Option<GenerationId> {
        self.bound.lock().get(key).and_then(|i| i.generation_id())
    }

    pub fn len(&self) -> usize {
        self.bound.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.lock().is_empty()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Reloading handle for one artifact
pub struct Woven {
    key: ArtifactKey,
    engine: ReloadEngine,
    delegate: RwLock<Arc<Instance>>,
    rebind: tokio::sync::Mutex<()>,
}

impl Woven {
    /// Bind to the freshest definition of `key`.
    ///
    /// A failure here is returned as is; there is no earlier delegate to
    /// fall back to.
    pub async fn bind(engine: ReloadEngine, key: ArtifactKey) -> ReloadResult<Self> {
        let binding = engine.resolve(&key).await?;
        let instance = binding.instantiate(&key)?;
        debug!("Woven {} bound to {:?}", key, binding);
        Ok(Self {
            key,
            engine,
            delegate: RwLock::new(Arc::new(instance)),
            rebind: tokio::sync::Mutex::new(()),
        })
    }

    pub fn key(&self) -> &ArtifactKey {
        &self.key
    }

    /// Currently held delegate
    pub fn delegate(&self) -> Arc<Instance> {
        self.delegate.read().clone()
    }

    /// Generation of the held delegate
    pub fn generation(&self) -> Option<GenerationId> {
        self.delegate.read().generation_id()
    }

    /// Forward one operation, rebinding first if allowed in this request.
    pub async fn invoke(
        &self,
        request: &RequestContext,
        operation: &str,
        input: Value,
    ) -> ReloadResult<Value> {
        let instance = self.instance_for(request).await;
        Ok(instance.invoke(operation, input)?)
    }

    /// Instance serving `request`: the one pinned earlier in the request, or
    /// the freshest available, which is then pinned.
    pub async fn instance_for(&self, request: &RequestContext) -> Arc<Instance> {
        if !self.engine.is_dynamic(&self.key) {
            return self.delegate();
        }
        if let Some(bound) = request.bound(&self.key) {
            return bound;
        }
        let instance = self.weave_delegate().await;
        request.bind(self.key.clone(), instance)
    }

    async fn weave_delegate(&self) -> Arc<Instance> {
        let held = self.delegate();
        if !self.engine.pending(&self.key, held.generation_id()) {
            return held;
        }

        let _guard = self.rebind.lock().await;
        // another request may have rebound while we waited
        let held = self.delegate();
        if !self.engine.pending(&self.key, held.generation_id()) {
            return held;
        }

        let binding = match self.engine.resolve(&self.key).await {
            Ok(binding) => binding,
            Err(e) => {
                warn!("Keeping {} of {}: {}", describe(&held), self.key, e);
                return held;
            }
        };
        if binding.generation_id() <= held.generation_id() {
            return held;
        }

        match binding.instantiate(&self.key) {
            Ok(instance) => {
                let instance = Arc::new(instance);
                debug!(
                    "Woven {} rebound {} -> {}",
                    self.key,
                    describe(&held),
                    describe(&instance)
                );
                *self.delegate.write() = instance.clone();
                instance
            }
            Err(e) => {
                warn!("Keeping {} of {}: {}", describe(&held), self.key, e);
                held
            }
        }
    }
}

fn describe(instance: &Instance) -> String {
    match instance.generation_id() {
        Some(id) => id.to_string(),
        None => "static definition".to_string(),
    }
}

impl std::fmt::Debug for Woven {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Woven")
            .field("key", &self.key)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{Binding, Generation};
    use hotweave_kernel::{
        Definition, EngineKind, Extension, FnExtension, LoadError, StaticDefinition,
    };
    use serde_json::json;
    use std::path::PathBuf;

    struct Tagged(u64);

    impl Definition for Tagged {
        fn instantiate(&self) -> Result<Box<dyn Extension>, LoadError> {
            let tag = self.0;
            Ok(Box::new(FnExtension::new(move |_, _| Ok(json!(tag)))))
        }
    }

    fn instance(id: u64) -> Arc<Instance> {
        let generation = Arc::new(Generation::new(
            "Foo".into(),
            GenerationId::new(id),
            EngineKind::Script,
            PathBuf::from("/nonexistent"),
            Arc::new(Tagged(id)),
        ));
        Arc::new(generation.instantiate().unwrap())
    }

    #[test]
    fn test_request_context_first_binding_wins() {
        let request = RequestContext::new();
        let key = ArtifactKey::new("Foo");
        assert!(request.is_empty());

        let first = request.bind(key.clone(), instance(1));
        let second = request.bind(key.clone(), instance(2));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(request.generation_of(&key), Some(GenerationId::new(1)));
        assert_eq!(request.len(), 1);
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(RequestContext::new().id(), RequestContext::new().id());
    }

    #[test]
    fn test_static_binding_has_no_generation() {
        let key = ArtifactKey::new("Static");
        let binding = Binding::Static(StaticDefinition::new(|| {
            Box::new(FnExtension::new(|_, _| Ok(json!("s"))))
        }));
        let instance = binding.instantiate(&key).unwrap();
        assert_eq!(describe(&instance), "static definition");
        assert_eq!(describe(&self::instance(3)), "g3");
    }
}
