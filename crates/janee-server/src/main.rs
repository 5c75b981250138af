// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use janee_server::{Dispatcher, DispatcherOptions, JaneeMcpServer, transport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "janeed", version, about = "Janee credential broker daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the MCP tool surface.
    Serve {
        /// Config directory (default: ~/.janee).
        #[arg(long)]
        config_dir: Option<PathBuf>,

        /// Transport to bind.
        #[arg(long, value_enum, default_value_t = Transport::Stdio)]
        transport: Transport,

        /// Do not advertise the janee_exec tool.
        #[arg(long)]
        no_exec: bool,

        /// Enable request/response debug logging.
        #[arg(long)]
        debug: bool,
    },

    /// Create a fresh config with a new master key.
    Init {
        /// Config directory (default: ~/.janee).
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Transport {
    /// Line-framed MCP on stdin/stdout.
    Stdio,
    /// Streamable HTTP at /mcp on the configured host:port.
    Http,
}

fn default_config_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".janee")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Init { config_dir } => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("janee=info"))
                .init();
            let dir = config_dir.unwrap_or_else(default_config_dir);
            let store = janee_store::SecretStore::new(&dir);
            store
                .init()
                .with_context(|| format!("initialise config in {}", dir.display()))?;
            println!("created {}", store.config_path().display());
            Ok(())
        }

        Command::Serve {
            config_dir,
            transport: transport_kind,
            no_exec,
            debug,
        } => {
            let filter = if debug {
                EnvFilter::new("janee=debug")
            } else {
                EnvFilter::new("janee=info")
            };
            tracing_subscriber::fmt().with_env_filter(filter).init();

            let dir = config_dir.unwrap_or_else(default_config_dir);
            let options = DispatcherOptions {
                enable_exec: !no_exec,
                enable_reload: true,
            };

            // Fatal startup error (missing/corrupt config, bad TTL) exits 1.
            let dispatcher = Arc::new(
                Dispatcher::from_config_dir(&dir, options)
                    .with_context(|| format!("load config from {}", dir.display()))?,
            );

            let store = janee_store::SecretStore::new(&dir);
            if let Ok(loaded) = store.load() {
                for warning in janee_store::warnings(&loaded.config) {
                    warn!("{warning}");
                }
            }

            let snapshot = dispatcher.snapshot();
            info!(
                config = %dir.display(),
                services = snapshot.services.len(),
                capabilities = snapshot.capabilities.len(),
                "janeed starting"
            );

            let server = JaneeMcpServer::new(dispatcher);
            match transport_kind {
                Transport::Stdio => transport::serve_stdio(server).await,
                Transport::Http => {
                    let (host, port) = (snapshot.server.host.clone(), snapshot.server.port);
                    transport::serve_http(server, &host, port).await
                }
            }
        }
    }
}
