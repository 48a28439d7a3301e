// src/config/loader.rs

use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::config::model::{ClientConfig, RawClientConfig, RawServerConfig, ServerConfig};
use crate::errors::Result;

/// Read and deserialize a client config file. No semantic validation.
pub fn load_raw_client_config(path: impl AsRef<Path>) -> Result<RawClientConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {:?}", path))?;
    Ok(toml::from_str(&contents)?)
}

/// Read and deserialize a server config file. No semantic validation.
pub fn load_raw_server_config(path: impl AsRef<Path>) -> Result<RawServerConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {:?}", path))?;
    Ok(toml::from_str(&contents)?)
}

/// Load a client config and run startup validation.
///
/// Relative `base_dir` values are resolved against the current working
/// directory, matching how the file is found.
pub fn load_client_config(path: impl AsRef<Path>) -> Result<ClientConfig> {
    ClientConfig::try_from(load_raw_client_config(path)?)
}

/// Load a server config and run startup validation.
pub fn load_server_config(path: impl AsRef<Path>) -> Result<ServerConfig> {
    ServerConfig::try_from(load_raw_server_config(path)?)
}
