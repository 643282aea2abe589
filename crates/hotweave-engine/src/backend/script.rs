//! Rhai script backend
//!
//! A script artifact is a `.rhai` file whose top-level functions are its
//! operations. Every operation receives the call input as its single argument.
//! Imports are resolved at compile time against the script's own directory
//! and the engine's classpath, so each generation is self-contained.

use super::{CompileUnit, CompiledArtifact, CompilerBackend};
use async_trait::async_trait;
use dashmap::DashMap;
use hotweave_kernel::config::ScriptLimits;
use hotweave_kernel::{
    Classpath, CompileError, Definition, Diagnostic, EngineKind, Extension, ExtensionError,
    LoadError,
};
use rhai::module_resolvers::{FileModuleResolver, ModuleResolversCollection};
use rhai::{AST, Dynamic, Engine, EvalAltResult, Map, Module, Scope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const EXTENSIONS: &[&str] = &["rhai"];

/// Written next to the frozen source; lists the import roots it compiled with
const IMPORT_ROOTS_FILE: &str = "imports.json";

/// Name the call input is bound to when an operation is invoked
const INPUT_VAR: &str = "input";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ImportRoots {
    roots: Vec<PathBuf>,
}

/// Compiles `.rhai` sources into frozen, self-contained ASTs
pub struct ScriptBackend {
    limits: ScriptLimits,
    /// ASTs compiled but not yet defined, keyed by output file
    staged: DashMap<PathBuf, AST>,
}

impl ScriptBackend {
    pub fn new(limits: ScriptLimits) -> Self {
        Self {
            limits,
            staged: DashMap::new(),
        }
    }

    fn compiler(&self, roots: &[PathBuf]) -> Engine {
        let mut engine = new_engine(&self.limits);
        let mut resolvers = ModuleResolversCollection::new();
        for root in roots {
            resolvers.push(FileModuleResolver::new_with_path(root));
        }
        engine.set_module_resolver(resolvers);
        engine
    }

    /// Number of compiled outputs waiting for [`CompilerBackend::define`]
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }
}

impl Default for ScriptBackend {
    fn default() -> Self {
        Self::new(ScriptLimits::default())
    }
}

fn new_engine(limits: &ScriptLimits) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);
    engine
}

/// The script's own directory first, then the classpath
fn import_roots(classpath: &Classpath, script_dir: Option<&Path>) -> Vec<PathBuf> {
    script_dir
        .map(Path::to_path_buf)
        .into_iter()
        .chain(classpath.search_paths.iter().cloned())
        .collect()
}

fn is_operation_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn to_diagnostic(err: &EvalAltResult, file: &Path) -> Diagnostic {
    let message = match err {
        EvalAltResult::ErrorParsing(kind, _) => kind.to_string(),
        other => other.to_string(),
    };
    let diagnostic = Diagnostic::error(message).with_file(file);
    let pos = err.position();
    match (pos.line(), pos.position()) {
        (Some(line), Some(column)) => diagnostic.at(line as u32, column as u32),
        (Some(line), None) => diagnostic.at(line as u32, 0),
        _ => diagnostic,
    }
}

#[async_trait]
impl CompilerBackend for ScriptBackend {
    fn kind(&self) -> EngineKind {
        EngineKind::Script
    }

    fn extensions(&self) -> &[&'static str] {
        EXTENSIONS
    }

    async fn compile(&self, unit: CompileUnit<'_>) -> Result<CompiledArtifact, CompileError> {
        let source_path = unit.source_path();
        let source = tokio::fs::read_to_string(&source_path)
            .await
            .map_err(|e| CompileError::single(&source_path, format!("cannot read source: {}", e)))?;

        let roots = import_roots(unit.classpath, source_path.parent());
        let ast = self
            .compiler(&roots)
            .compile_into_self_contained(&Scope::new(), &source)
            .map_err(|e| CompileError::new(&source_path, vec![to_diagnostic(&e, &source_path)]))?;

        let mut warnings = Vec::new();
        if ast.iter_functions().next().is_none() {
            warnings.push(
                Diagnostic::warning("script defines no functions; it exposes no operations")
                    .with_file(&source_path),
            );
        }

        let file_name = unit
            .relative_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("artifact.rhai"));
        let output = unit.output_dir.join(file_name);
        let write_error =
            |e: std::io::Error| CompileError::single(&source_path, format!("cannot write {}: {}", output.display(), e));
        tokio::fs::write(&output, &source).await.map_err(write_error)?;
        let manifest = serde_json::to_vec(&ImportRoots { roots })
            .map_err(|e| CompileError::single(&source_path, e.to_string()))?;
        tokio::fs::write(unit.output_dir.join(IMPORT_ROOTS_FILE), manifest)
            .await
            .map_err(write_error)?;

        debug!("Compiled script {} -> {}", source_path.display(), output.display());
        self.staged.insert(output.clone(), ast);
        Ok(CompiledArtifact {
            output_dir: unit.output_dir.to_path_buf(),
            output,
            warnings,
        })
    }

    fn define(&self, output: &Path) -> Result<Arc<dyn Definition>, LoadError> {
        let ast = match self.staged.remove(output) {
            Some((_, ast)) => ast,
            None => {
                let malformed = |reason: String| LoadError::Malformed {
                    path: output.to_path_buf(),
                    reason,
                };
                let source = std::fs::read_to_string(output)?;
                let roots = match std::fs::read(output.with_file_name(IMPORT_ROOTS_FILE)) {
                    Ok(bytes) => serde_json::from_slice::<ImportRoots>(&bytes)
                        .map_err(|e| malformed(e.to_string()))?,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => ImportRoots::default(),
                    Err(e) => return Err(e.into()),
                };
                self.compiler(&roots.roots)
                    .compile_into_self_contained(&Scope::new(), &source)
                    .map_err(|e| malformed(e.to_string()))?
            }
        };
        Ok(Arc::new(ScriptDefinition {
            limits: self.limits.clone(),
            ast: Arc::new(ast),
        }))
    }

    fn discard(&self, compiled: &CompiledArtifact) {
        self.staged.remove(&compiled.output);
    }
}

/// A defined script: its frozen AST and the limits instances run under
pub struct ScriptDefinition {
    limits: ScriptLimits,
    ast: Arc<AST>,
}

impl Definition for ScriptDefinition {
    /// Runs the script's top-level code, imports included, into a module
    /// private to the new instance.
    fn instantiate(&self) -> Result<Box<dyn Extension>, LoadError> {
        let mut engine = new_engine(&self.limits);
        let module = Module::eval_ast_as_new(Scope::new(), &self.ast, &engine)
            .map_err(|e| LoadError::Instantiation(e.to_string()))?;
        engine.register_global_module(module.into());
        Ok(Box::new(ScriptInstance { engine }))
    }
}

/// Script instance; its functions keep the imports they were loaded with
pub struct ScriptInstance {
    engine: Engine,
}

impl Extension for ScriptInstance {
    fn invoke(&self, operation: &str, input: Value) -> Result<Value, ExtensionError> {
        if !is_operation_name(operation) {
            return Err(ExtensionError::UnknownOperation(operation.to_string()));
        }
        let mut scope = Scope::new();
        scope.push(INPUT_VAR, json_to_dynamic(&input));
        let call = format!("{}({})", operation, INPUT_VAR);
        let result: Dynamic = self
            .engine
            .eval_with_scope(&mut scope, &call)
            .map_err(|e| match *e {
                EvalAltResult::ErrorFunctionNotFound(ref signature, _)
                    if signature.split_whitespace().next() == Some(operation) =>
                {
                    ExtensionError::UnknownOperation(operation.to_string())
                }
                other => ExtensionError::Failed(other.to_string()),
            })?;
        Ok(dynamic_to_json(&result))
    }
}

/// Convert a JSON value into a Rhai value
pub fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Dynamic::from(i),
            None => n.as_f64().map(Dynamic::from).unwrap_or(Dynamic::UNIT),
        },
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => Dynamic::from(items.iter().map(json_to_dynamic).collect::<Vec<_>>()),
        Value::Object(obj) => {
            let mut map = Map::new();
            for (k, v) in obj {
                map.insert(k.as_str().into(), json_to_dynamic(v));
            }
            Dynamic::from(map)
        }
    }
}

/// Convert a Rhai value into JSON. Unknown types become their display string.
pub fn dynamic_to_json(value: &Dynamic) -> Value {
    if value.is_unit() {
        Value::Null
    } else if let Ok(b) = value.as_bool() {
        Value::Bool(b)
    } else if let Ok(i) = value.as_int() {
        Value::from(i)
    } else if let Ok(f) = value.as_float() {
        serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    } else if value.is_string() {
        Value::String(value.to_string())
    } else if value.is_array() {
        let items = value.clone().cast::<rhai::Array>();
        Value::Array(items.iter().map(dynamic_to_json).collect())
    } else if value.is_map() {
        let map = value.clone().cast::<Map>();
        Value::Object(
            map.iter()
                .map(|(k, v)| (k.to_string(), dynamic_to_json(v)))
                .collect(),
        )
    } else {
        Value::String(value.to_string())
    }
}
