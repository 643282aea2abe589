use hotweave_engine::{Binding, ReloadEngine};
use hotweave_kernel::{ArtifactKey, EngineConfig, EngineKind, ReloadError, ReloadEvent};
use hotweave_testing::tree::write_file;
use hotweave_testing::{EventRecorder, SourceTree, assert_generation};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn key(relative: &str) -> ArtifactKey {
    ArtifactKey::from_relative_path(Path::new(relative))
}

async fn call(engine: &ReloadEngine, key: &ArtifactKey, operation: &str, input: Value) -> Value {
    engine
        .instantiate(key)
        .await
        .unwrap()
        .invoke(operation, input)
        .unwrap()
}

fn generation(binding: &Binding) -> u64 {
    binding.generation_id().unwrap().get()
}

#[tokio::test]
async fn test_script_fail_then_fix() {
    let tree = SourceTree::new().unwrap();
    tree.write("Foo.rhai", r#"fn render(input) { "v1" }"#).unwrap();
    let engine = ReloadEngine::new(tree.config(EngineKind::Script)).unwrap();
    engine.discover_configured().await.unwrap();
    let foo = key("Foo.rhai");

    assert_eq!(generation(&engine.resolve(&foo).await.unwrap()), 1);
    assert_eq!(call(&engine, &foo, "render", Value::Null).await, json!("v1"));

    tree.write("Foo.rhai", "fn render(input) {\n  let = 2;\n  \"v2\"\n}").unwrap();
    assert_eq!(engine.scan_now().await.tainted, vec![foo.clone()]);

    // broken source keeps serving the previous generation
    assert_eq!(generation(&engine.resolve(&foo).await.unwrap()), 1);
    assert_eq!(call(&engine, &foo, "render", Value::Null).await, json!("v1"));
    assert!(engine.registry().get(&foo).unwrap().tainted);
    let diagnostics = engine.last_diagnostics(EngineKind::Script);
    assert!(!diagnostics.is_empty());
    assert!(diagnostics.iter().all(|d| d.is_error() && d.line.is_some()));

    tree.write("Foo.rhai", r#"fn render(input) { "v2" }"#).unwrap();
    assert_eq!(generation(&engine.resolve(&foo).await.unwrap()), 2);
    assert_eq!(call(&engine, &foo, "render", Value::Null).await, json!("v2"));
    assert_generation!(engine, foo, 2);

    let record = engine.registry().get(&foo).unwrap();
    assert!(!record.tainted && record.tainted_once);
    assert!(engine.scan_now().await.is_quiet());
}

#[tokio::test]
async fn test_first_broken_script_is_an_error() {
    let tree = SourceTree::new().unwrap();
    tree.write("Broken.rhai", "fn render( {").unwrap();
    let engine = ReloadEngine::new(tree.config(EngineKind::Script)).unwrap();
    engine.discover_configured().await.unwrap();

    let err = engine.resolve(&key("Broken.rhai")).await.unwrap_err();
    assert!(matches!(err, ReloadError::Compile(_)));
    assert!(engine.loader().current(&key("Broken.rhai")).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_daemon_taints_and_woven_rebinds_per_request() {
    let tree = SourceTree::new().unwrap();
    tree.write("ui/Button.rhai", r#"fn render(input) { "old " + input.label }"#)
        .unwrap();
    let engine = ReloadEngine::new(tree.config(EngineKind::Script)).unwrap();
    engine.discover_configured().await.unwrap();
    let button = key("ui/Button.rhai");
    let woven = engine.weave(button.clone()).await.unwrap();

    let mut events = EventRecorder::new(engine.subscribe());
    engine.start().unwrap();

    let first = engine.begin_request();
    let input = json!({"label": "Ok"});
    assert_eq!(woven.invoke(&first, "render", input.clone()).await.unwrap(), json!("old Ok"));

    tree.write("ui/Button.rhai", r#"fn render(input) { "new " + input.label }"#)
        .unwrap();
    let tainted = events
        .wait_for(WAIT, |e| matches!(e, ReloadEvent::Tainted { .. }))
        .await;
    assert!(tainted.is_some(), "daemon never noticed the change");

    // the request already under way keeps the instance it started with
    assert_eq!(woven.invoke(&first, "render", input.clone()).await.unwrap(), json!("old Ok"));

    let second = engine.begin_request();
    assert_eq!(woven.invoke(&second, "render", input).await.unwrap(), json!("new Ok"));
    assert_eq!(first.generation_of(&button).map(|g| g.get()), Some(1));
    assert_eq!(second.generation_of(&button).map(|g| g.get()), Some(2));

    engine.stop().await;
    assert!(!engine.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_untouched_sources_are_never_compiled() {
    let tree = SourceTree::new().unwrap();
    tree.write("Idle.rhai", "fn ping(input) { 1 }").unwrap();
    let engine = ReloadEngine::new(tree.config(EngineKind::Script)).unwrap();
    let mut events = EventRecorder::new(engine.subscribe());
    engine.discover_configured().await.unwrap();

    engine.start().unwrap();
    tokio::time::sleep(engine.config().poll_interval() * 8).await;
    engine.stop().await;

    assert_eq!(events.count(|e| matches!(e, ReloadEvent::Tainted { .. })), 0);
    assert_eq!(events.count(|e| matches!(e, ReloadEvent::CompileStarted { .. })), 0);
    let record = engine.registry().get(&key("Idle.rhai")).unwrap();
    assert!(!record.tainted && !record.tainted_once);
    assert!(record.generation.is_none());
}

#[tokio::test]
async fn test_classpath_library_is_frozen_per_generation() {
    let tree = SourceTree::new().unwrap();
    let lib = tree.lib_dir("lib").unwrap();
    write_file(&lib.join("math.rhai"), "fn scale(x) { x * 2 }").unwrap();
    tree.write("Calc.rhai", r#"import "math" as m; fn run(input) { m::scale(input) }"#)
        .unwrap();

    let config = tree.config(EngineKind::Script).with_engine(
        EngineConfig::new(EngineKind::Script)
            .with_source_root(tree.root())
            .with_classpath(hotweave_kernel::Classpath::new().with_search_path(&lib)),
    );
    let engine = ReloadEngine::new(config).unwrap();
    engine.discover_configured().await.unwrap();
    let calc = key("Calc.rhai");

    assert_eq!(call(&engine, &calc, "run", json!(21)).await, json!(42));

    // library edits reach the artifact only through a recompile of it
    write_file(&lib.join("math.rhai"), "fn scale(x) { x * 10 }").unwrap();
    assert_eq!(call(&engine, &calc, "run", json!(21)).await, json!(42));
    tree.touch("Calc.rhai").unwrap();
    engine.scan_now().await;
    assert_eq!(call(&engine, &calc, "run", json!(21)).await, json!(210));
    assert_generation!(engine, calc, 2);
}

#[tokio::test]
async fn test_rebuild_engine_reports_each_artifact() {
    let tree = SourceTree::new().unwrap();
    tree.write("a/Good.rhai", "fn ok(input) { true }").unwrap();
    tree.write("b/Bad.rhai", "fn ok(input) { ").unwrap();
    let engine = ReloadEngine::new(tree.config(EngineKind::Script)).unwrap();
    engine.discover_configured().await.unwrap();

    let report = engine.rebuild_engine(EngineKind::Script).await.unwrap();
    assert_eq!(report.refreshed, vec![key("a/Good.rhai")]);
    assert_eq!(report.failed, vec![key("b/Bad.rhai")]);
    assert!(report.diagnostics.iter().any(|d| d.is_error()));
    assert_generation!(engine, key("a/Good.rhai"), 1);
}

#[tokio::test]
async fn test_vanished_source_is_purged() {
    let tree = SourceTree::new().unwrap();
    tree.write("Gone.rhai", "fn ping(input) { 1 }").unwrap();
    let engine = ReloadEngine::new(tree.config(EngineKind::Script)).unwrap();
    engine.discover_configured().await.unwrap();
    let gone = key("Gone.rhai");
    let instance = engine.instantiate(&gone).await.unwrap();

    tree.remove("Gone.rhai").unwrap();
    let purged = engine.purge_vanished().await;
    assert_eq!(purged.len(), 1);
    assert_eq!(purged[0].record.key, gone);
    assert!(!engine.registry().contains(&gone));
    assert!(engine.registry().tombstone(&gone).is_some());

    // instances handed out earlier keep working
    assert_eq!(instance.invoke("ping", Value::Null).unwrap(), json!(1));
    assert!(matches!(
        engine.resolve(&gone).await,
        Err(ReloadError::UnknownArtifact(_))
    ));
}
