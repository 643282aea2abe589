use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_detect_format() {
    assert_eq!(detect_format(Path::new("reload.yaml")).unwrap(), FileFormat::Yaml);
    assert_eq!(detect_format(Path::new("reload.yml")).unwrap(), FileFormat::Yaml);
    assert_eq!(detect_format(Path::new("reload.toml")).unwrap(), FileFormat::Toml);
    assert_eq!(detect_format(Path::new("reload.json")).unwrap(), FileFormat::Json);
    assert!(detect_format(Path::new("reload.txt")).is_err());
    assert!(detect_format(Path::new("reload")).is_err());
}

#[test]
fn test_defaults_are_valid() {
    let config = ReloadConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.poll_interval(), Duration::from_millis(2000));
    assert!(config.is_enabled(EngineKind::Script));
    assert!(config.is_enabled(EngineKind::Native));
}

#[test]
fn test_from_str_toml() {
    let toml = r#"
poll_interval_ms = 500
output_root = "/tmp/hw-out"
full_rebuild_threshold = 3

[[engines]]
kind = "script"
source_roots = ["/srv/scripts"]

[[engines]]
kind = "native"
enabled = false

[native]
rustc = "/opt/rust/bin/rustc"
"#;

    let config: ReloadConfig = from_str(toml, FileFormat::Toml).unwrap();
    assert_eq!(config.poll_interval_ms, 500);
    assert_eq!(config.output_root, PathBuf::from("/tmp/hw-out"));
    assert_eq!(config.full_rebuild_threshold, 3);
    assert!(config.is_enabled(EngineKind::Script));
    assert!(!config.is_enabled(EngineKind::Native));
    assert_eq!(
        config.engine(EngineKind::Script).unwrap().source_roots,
        vec![PathBuf::from("/srv/scripts")]
    );
    assert_eq!(config.native.rustc, PathBuf::from("/opt/rust/bin/rustc"));
    // untouched sections keep their defaults
    assert_eq!(config.native.edition, "2021");
    assert_eq!(config.script, ScriptLimits::default());
}

#[test]
fn test_from_file_yaml_with_classpath() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reload.yaml");
    fs::write(
        &path,
        r#"
poll_interval_ms: 250
engines:
  - kind: native
    source_roots: ["./native"]
    classpath:
      search_paths: ["target/debug/deps"]
      externs:
        - name: hotweave_kernel
          path: target/debug/libhotweave_kernel.rlib
"#,
    )
    .unwrap();

    let config = ReloadConfig::from_file(&path).unwrap();
    assert_eq!(config.poll_interval_ms, 250);
    assert_eq!(config.engines.len(), 1);
    let classpath = config.classpath(EngineKind::Native);
    assert_eq!(classpath.search_paths, vec![PathBuf::from("target/debug/deps")]);
    assert_eq!(classpath.externs[0].name, "hotweave_kernel");
    assert!(config.classpath(EngineKind::Script).search_paths.is_empty());
}

#[test]
fn test_validate_rejects_zero_interval() {
    let config = ReloadConfig::default().with_poll_interval(Duration::ZERO);
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_validate_rejects_duplicate_engines() {
    let mut config = ReloadConfig::default();
    config.engines.push(EngineConfig::new(EngineKind::Script));
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("script"));
}

#[test]
fn test_with_engine_replaces_existing() {
    let config = ReloadConfig::default()
        .with_engine(EngineConfig::new(EngineKind::Native).disabled());
    assert_eq!(config.engines.len(), 2);
    assert!(!config.is_enabled(EngineKind::Native));
}

#[test]
fn test_substitute_leaves_unknown_vars() {
    let content = "root = \"${HOTWEAVE_SURELY_UNSET_VAR}/x\"";
    assert_eq!(substitute_env_vars(content), content);
}

#[test]
fn test_substitute_known_var() {
    // PATH is set in every test environment
    let path = std::env::var("PATH").unwrap();
    assert_eq!(substitute_env_vars("p=${PATH}"), format!("p={}", path));
}

#[test]
fn test_load_report_mentions_path() {
    let report = load_config_report("/definitely/not/here/reload.toml").unwrap_err();
    let rendered = format!("{:?}", report);
    assert!(rendered.contains("/definitely/not/here/reload.toml"));
}
