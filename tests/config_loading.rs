// tests/config_loading.rs

use std::fs;
use std::time::Duration;

use syncds::config::{load_client_config, load_server_config};
use syncds::errors::SyncdsError;

#[test]
fn loads_client_config_relative_to_its_values() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("xx-app/src")).unwrap();
    let path = dir.path().join("syncds-client.toml");
    fs::write(
        &path,
        format!(
            r#"
server = "10.0.0.5:8003"
base_dir = {:?}
interval_ms = 500
debug = true
include_paths = ["xx-app/src"]
include_file_regexp = '\.(go|yml)$'
deploy_cmd = "make run"
"#,
            dir.path()
        ),
    )
    .unwrap();

    let cfg = load_client_config(&path).unwrap();
    assert_eq!(cfg.server, "10.0.0.5:8003");
    assert_eq!(cfg.interval, Duration::from_millis(500));
    assert!(cfg.debug);
    assert_eq!(cfg.rules.len(), 1);
    assert_eq!(cfg.rules[0].include_paths, vec!["xx-app/src".to_string()]);
    assert!(cfg.rules[0].include_file.as_ref().unwrap().is_match("xx-app/src/a.go"));
    assert_eq!(cfg.rules[0].deploy_cmd.as_deref(), Some("make run"));
}

#[test]
fn server_defaults_apply() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("syncds-server.toml");
    fs::write(
        &path,
        format!("listen = \"0.0.0.0:8003\"\nbase_dir = {:?}\n", dir.path()),
    )
    .unwrap();

    let cfg = load_server_config(&path).unwrap();
    assert_eq!(cfg.listen, "0.0.0.0:8003");
    assert_eq!(cfg.deploy_cooldown, Duration::from_millis(2000));
    assert_eq!(cfg.fingerprint_cache_capacity, 100);
}

#[test]
fn zero_cache_capacity_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("syncds-server.toml");
    fs::write(
        &path,
        format!(
            "listen = \"0.0.0.0:8003\"\nbase_dir = {:?}\nfingerprint_cache_capacity = 0\n",
            dir.path()
        ),
    )
    .unwrap();

    assert!(matches!(
        load_server_config(&path),
        Err(SyncdsError::ConfigError(_))
    ));
}

#[test]
fn malformed_toml_and_missing_file_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "server = [").unwrap();

    assert!(matches!(
        load_client_config(&path),
        Err(SyncdsError::TomlError(_))
    ));
    assert!(load_client_config(dir.path().join("absent.toml")).is_err());
}
