// src/lib.rs

pub mod cli;
pub mod client;
pub mod collect;
pub mod config;
pub mod deploy;
pub mod diff;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod path_utils;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod types;
pub mod watch;

use anyhow::Result;
use tracing::{Instrument, info, info_span};

use crate::cli::{CliArgs, Command};
use crate::config::templates::{CLIENT_TEMPLATE, SERVER_TEMPLATE, write_template};
use crate::config::{load_client_config, load_server_config};

pub use client::start_client;
pub use server::start_server;

/// High-level entry point used by `main.rs`.
///
/// `--init` writes the starter config and returns. Otherwise the role's
/// config is loaded and validated, logging is set up, and the client or
/// server runs until it stops.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.command.config_path();
    let role = args.command.role_args();

    if role.init {
        let template = match &args.command {
            Command::Client(_) => CLIENT_TEMPLATE,
            Command::Server(_) => SERVER_TEMPLATE,
        };
        if write_template(&config_path, template)? {
            println!(
                "config {} initialized; please check the options",
                config_path.display()
            );
        } else {
            println!(
                "config {} already exists; leaving it untouched",
                config_path.display()
            );
        }
        return Ok(());
    }

    let name = role.name.clone().unwrap_or_else(|| "default".to_string());

    match &args.command {
        Command::Client(_) => {
            let config = load_client_config(&config_path)?;
            logging::init_logging(args.log_level, config.debug)?;
            info!(config = ?config_path, server = %config.server, "starting client");
            start_client(config)
                .instrument(info_span!("client", name = %name))
                .await?;
        }
        Command::Server(_) => {
            let config = load_server_config(&config_path)?;
            logging::init_logging(args.log_level, false)?;
            info!(config = ?config_path, listen = %config.listen, "starting server");
            start_server(config)
                .instrument(info_span!("server", name = %name))
                .await?;
        }
    }

    Ok(())
}
