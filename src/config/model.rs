// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

/// Default debounce window / collector tick.
pub const DEFAULT_INTERVAL_MS: u64 = 3000;
/// Default grace sleep between killing the old deploy and starting the new one.
pub const DEFAULT_DEPLOY_COOLDOWN_MS: u64 = 2000;
/// Default capacity of the server's fingerprint cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Client configuration as read from a TOML file.
///
/// Two shapes are accepted:
///
/// ```toml
/// server = "127.0.0.1:8003"
/// base_dir = "./"
/// interval_ms = 3000
/// include_paths = ["src", "app.jar"]
/// deploy_cmd = "java -jar app.jar"
/// ```
///
/// or, for several disjoint subtrees with their own deploy commands,
/// one `[[watch]]` table per rule. The top-level rule fields are only used
/// when no `[[watch]]` table is present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawClientConfig {
    pub server: String,

    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default)]
    pub debug: bool,

    #[serde(flatten)]
    pub rule: RawWatchRule,

    #[serde(default)]
    pub watch: Vec<RawWatchRule>,
}

/// One watch rule before regex compilation and path checks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawWatchRule {
    #[serde(default)]
    pub include_paths: Vec<String>,

    /// Only files whose relative path matches are synced.
    #[serde(default)]
    pub include_file_regexp: Option<String>,

    /// Paths (files or directories) matching this are ignored.
    #[serde(default)]
    pub exclude_path_regexp: Option<String>,

    /// A batch triggers the deploy only if one of its paths matches.
    /// If unset, any non-empty batch triggers it.
    #[serde(default)]
    pub deploy_path_regexp: Option<String>,

    #[serde(default)]
    pub deploy_cmd: Option<String>,

    /// Shell command run if killing the previous deploy process fails.
    #[serde(default)]
    pub deploy_kill_cmd: Option<String>,
}

/// Server configuration as read from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct RawServerConfig {
    pub listen: String,

    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    #[serde(default = "default_cooldown_ms")]
    pub deploy_cooldown_ms: u64,

    #[serde(default = "default_cache_capacity")]
    pub fingerprint_cache_capacity: usize,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("./")
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_cooldown_ms() -> u64 {
    DEFAULT_DEPLOY_COOLDOWN_MS
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

/// Validated client configuration.
///
/// Construct via `ClientConfig::try_from(raw)`; see `config::validate`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the server.
    pub server: String,
    /// Absolute path of the synced tree.
    pub base_dir: PathBuf,
    /// Debounce window.
    pub interval: Duration,
    pub debug: bool,
    pub rules: Vec<WatchRule>,
}

/// A compiled watch rule.
///
/// `include_paths` are normalized (forward slashes, no `./`, no trailing
/// slash); an empty string covers the whole base directory.
#[derive(Debug, Clone, Default)]
pub struct WatchRule {
    pub include_paths: Vec<String>,
    pub include_file: Option<Regex>,
    pub exclude_path: Option<Regex>,
    pub deploy_path: Option<Regex>,
    pub deploy_cmd: Option<String>,
    pub deploy_kill_cmd: Option<String>,
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: String,
    pub base_dir: PathBuf,
    pub deploy_cooldown: Duration,
    pub fingerprint_cache_capacity: usize,
}
