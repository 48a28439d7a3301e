// src/logging.rs

//! `tracing` subscriber setup.
//!
//! The filter is picked from, in order:
//! 1. `--log-level` on the command line
//! 2. `SYNCDS_LOG`, which takes full `EnvFilter` directives
//!    (e.g. `syncds=debug,tungstenite=warn`)
//! 3. `debug = true` in the client config
//! 4. `info`
//!
//! Everything is written to stderr. Stdout belongs to the streamed deploy
//! output on the client side.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "SYNCDS_LOG";

/// Install the global subscriber. Call once per process.
pub fn init_logging(cli_level: Option<LogLevel>, debug: bool) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref(), debug);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("installing the tracing subscriber")
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>, debug: bool) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level.as_directive());
    }
    if let Some(directives) = env.map(str::trim).filter(|s| !s.is_empty()) {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("ignoring invalid {LOG_ENV}={directives:?}: {err}"),
        }
    }
    EnvFilter::new(if debug { "debug" } else { "info" })
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flag_beats_environment() {
        let filter = build_filter(Some(LogLevel::Warn), Some("trace"), true);
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn environment_beats_debug_flag() {
        let filter = build_filter(None, Some("syncds=trace"), true);
        assert_eq!(filter.to_string(), "syncds=trace");
    }

    #[test]
    fn debug_flag_and_default() {
        assert_eq!(build_filter(None, None, true).to_string(), "debug");
        assert_eq!(build_filter(None, Some("  "), false).to_string(), "info");
    }
}
