// src/config/mod.rs

//! Configuration loading and validation for syncds.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate startup invariants like include path containment (`validate.rs`).
//! - Provide the starter files written by `--init` (`templates.rs`).

pub mod loader;
pub mod model;
pub mod templates;
pub mod validate;

pub use loader::{load_client_config, load_server_config};
pub use model::{
    ClientConfig, RawClientConfig, RawServerConfig, RawWatchRule, ServerConfig, WatchRule,
};
