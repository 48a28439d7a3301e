// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::templates::{CLIENT_CONFIG_FILE, SERVER_CONFIG_FILE};

/// Command-line arguments for `syncds`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "syncds",
    version,
    about = "Sync changed files to a dev server and restart its deploy command.",
    long_about = None
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SYNCDS_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Watch local files and push changes to a server.
    Client(RoleArgs),
    /// Receive changes and run the deploy command.
    Server(RoleArgs),
}

/// Flags shared by `client` and `server`.
#[derive(Debug, Clone, Args)]
pub struct RoleArgs {
    /// Unique name of this instance (shows up in logs).
    #[arg(long, short = 'n', value_name = "NAME")]
    pub name: Option<String>,

    /// Write a starter config file and exit.
    #[arg(long, short = 'i')]
    pub init: bool,

    /// Path to the config file (TOML).
    ///
    /// Default: `syncds-client.toml` / `syncds-server.toml` in the current
    /// working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Command {
    pub fn role_args(&self) -> &RoleArgs {
        match self {
            Command::Client(args) | Command::Server(args) => args,
        }
    }

    /// Config path given on the command line, or the role's default file.
    pub fn config_path(&self) -> PathBuf {
        let default = match self {
            Command::Client(_) => CLIENT_CONFIG_FILE,
            Command::Server(_) => SERVER_CONFIG_FILE,
        };
        self.role_args()
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(default))
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
