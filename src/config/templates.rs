// src/config/templates.rs

//! Starter config files written by `syncds client --init` / `server --init`.

use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::errors::Result;

pub const CLIENT_CONFIG_FILE: &str = "syncds-client.toml";
pub const SERVER_CONFIG_FILE: &str = "syncds-server.toml";

pub const CLIENT_TEMPLATE: &str = r#"# Address of the syncds server (same as `listen` in syncds-server.toml).
server = "127.0.0.1:8003"
# Root of the synced tree. Keeping this file at the repository root with
# base_dir = "./" is the usual setup.
base_dir = "./"
# Debounce window in milliseconds.
interval_ms = 3000

# Files and directories to sync, relative to base_dir.
include_paths = ["xx-app/target/xx-app.jar", "xx-app/src/main/resources"]

# Optional: only sync files whose relative path matches.
include_file_regexp = '\.(yml|properties|jar)$'
# Optional: skip paths matching this, e.g. editor temp files.
exclude_path_regexp = '(___jb_tmp___|___jb_old___)$'
# Optional: only batches touching a matching path trigger the deploy.
# If unset, every synced batch triggers it.
deploy_path_regexp = '\.jar$'
# Command the server (re)starts after a triggering sync. Its stdout and
# stderr are streamed back here.
deploy_cmd = "java -jar xx-app/target/xx-app.jar"
# Optional: fallback used if the previous deploy process cannot be killed.
# deploy_kill_cmd = "pkill -f xx-app.jar"
"#;

pub const SERVER_TEMPLATE: &str = r#"# Address to listen on. Must be reachable from the client.
listen = "127.0.0.1:8003"
# Root directory synced files are written into.
base_dir = "./"
# Pause between killing the previous deploy and starting the next one.
deploy_cooldown_ms = 2000
"#;

/// Write `contents` to `path` unless the file already exists.
///
/// Returns `true` if the file was written.
pub fn write_template(path: impl AsRef<Path>, contents: &str) -> Result<bool> {
    let path = path.as_ref();
    if path.exists() {
        info!("config file {:?} exists; leaving it untouched", path);
        return Ok(false);
    }
    fs::write(path, contents).with_context(|| format!("writing config template {:?}", path))?;
    info!("config {:?} initialized; please check the options", path);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{RawClientConfig, RawServerConfig};

    #[test]
    fn templates_parse() {
        let client: RawClientConfig = toml::from_str(CLIENT_TEMPLATE).unwrap();
        assert_eq!(client.server, "127.0.0.1:8003");
        assert_eq!(client.rule.include_paths.len(), 2);
        assert!(client.watch.is_empty());

        let server: RawServerConfig = toml::from_str(SERVER_TEMPLATE).unwrap();
        assert_eq!(server.deploy_cooldown_ms, 2000);
    }

    #[test]
    fn existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SERVER_CONFIG_FILE);
        std::fs::write(&path, "listen = \"0.0.0.0:1\"\n").unwrap();

        assert!(!write_template(&path, SERVER_TEMPLATE).unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "listen = \"0.0.0.0:1\"\n"
        );
    }
}
