// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncdsError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Frame encode error: {0}")]
    EncodeError(#[from] bincode::error::EncodeError),

    #[error("Frame decode error: {0}")]
    DecodeError(#[from] bincode::error::DecodeError),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Transport error: {0}")]
    TransportError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncdsError {
    pub fn config(msg: impl Into<String>) -> Self {
        SyncdsError::ConfigError(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SyncdsError>;
