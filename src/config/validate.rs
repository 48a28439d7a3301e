// src/config/validate.rs

//! Startup validation: raw TOML structs become validated configs.
//!
//! Every failure here is a fatal configuration error. Nothing in this module
//! is re-checked at runtime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;

use crate::config::model::{
    ClientConfig, RawClientConfig, RawServerConfig, RawWatchRule, ServerConfig, WatchRule,
};
use crate::errors::{Result, SyncdsError};
use crate::path_utils::{is_contained_rel, normalize_rel};

impl TryFrom<RawClientConfig> for ClientConfig {
    type Error = SyncdsError;

    fn try_from(raw: RawClientConfig) -> Result<Self> {
        if raw.server.trim().is_empty() {
            return Err(SyncdsError::config("`server` must not be empty"));
        }
        if raw.interval_ms == 0 {
            return Err(SyncdsError::config("`interval_ms` must be >= 1 (got 0)"));
        }

        let base_dir = resolve_base_dir(&raw.base_dir)?;

        let raw_rules = if raw.watch.is_empty() {
            vec![raw.rule]
        } else {
            raw.watch
        };

        let rules = raw_rules
            .into_iter()
            .map(|r| compile_rule(&base_dir, r))
            .collect::<Result<Vec<_>>>()?;

        if rules.iter().all(|r| r.include_paths.is_empty()) {
            return Err(SyncdsError::config(
                "config must list at least one entry in `include_paths`",
            ));
        }

        Ok(ClientConfig {
            server: raw.server.trim().to_string(),
            base_dir,
            interval: Duration::from_millis(raw.interval_ms),
            debug: raw.debug,
            rules,
        })
    }
}

impl TryFrom<RawServerConfig> for ServerConfig {
    type Error = SyncdsError;

    fn try_from(raw: RawServerConfig) -> Result<Self> {
        if raw.listen.trim().is_empty() {
            return Err(SyncdsError::config("`listen` must not be empty"));
        }
        if raw.fingerprint_cache_capacity == 0 {
            return Err(SyncdsError::config(
                "`fingerprint_cache_capacity` must be >= 1 (got 0)",
            ));
        }

        Ok(ServerConfig {
            listen: raw.listen.trim().to_string(),
            base_dir: resolve_base_dir(&raw.base_dir)?,
            deploy_cooldown: Duration::from_millis(raw.deploy_cooldown_ms),
            fingerprint_cache_capacity: raw.fingerprint_cache_capacity,
        })
    }
}

/// Base directory must exist; it is made absolute so event paths from the
/// watcher can be related to it.
fn resolve_base_dir(base_dir: &Path) -> Result<PathBuf> {
    if !base_dir.is_dir() {
        return Err(SyncdsError::config(format!(
            "`base_dir` {:?} does not exist or is not a directory",
            base_dir
        )));
    }
    base_dir.canonicalize().map_err(|e| {
        SyncdsError::config(format!("cannot resolve `base_dir` {:?}: {e}", base_dir))
    })
}

fn compile_rule(base_dir: &Path, raw: RawWatchRule) -> Result<WatchRule> {
    let mut include_paths = Vec::with_capacity(raw.include_paths.len());
    for path in &raw.include_paths {
        include_paths.push(validate_include_path(base_dir, path)?);
    }

    Ok(WatchRule {
        include_paths,
        include_file: compile_regex("include_file_regexp", raw.include_file_regexp)?,
        exclude_path: compile_regex("exclude_path_regexp", raw.exclude_path_regexp)?,
        deploy_path: compile_regex("deploy_path_regexp", raw.deploy_path_regexp)?,
        deploy_cmd: non_empty(raw.deploy_cmd),
        deploy_kill_cmd: non_empty(raw.deploy_kill_cmd),
    })
}

/// Check one entry of `include_paths` and return its normalized form.
pub fn validate_include_path(base_dir: &Path, path: &str) -> Result<String> {
    if !is_contained_rel(path) {
        return Err(SyncdsError::config(format!(
            "`include_paths` must be relative paths without `..`; offending path: {path}"
        )));
    }
    let normalized = normalize_rel(path);
    let on_disk = base_dir.join(&normalized);
    if std::fs::symlink_metadata(&on_disk).is_err() {
        return Err(SyncdsError::config(format!(
            "include path {path} does not exist under {:?}",
            base_dir
        )));
    }
    Ok(normalized)
}

fn compile_regex(field: &str, pattern: Option<String>) -> Result<Option<Regex>> {
    match non_empty(pattern) {
        None => Ok(None),
        Some(p) => Regex::new(&p)
            .map(Some)
            .map_err(|e| SyncdsError::config(format!("invalid `{field}` {p:?}: {e}"))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
