//! Node daemon binary

use brickmgr::{Config, NodeServer};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "brickmgr-node")]
#[command(about = "brickmgr cluster management daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start node server
    Serve {
        /// Config file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bind address for the admin REST API
        #[arg(long)]
        rest: Option<SocketAddr>,

        /// Bind address for the internal API
        #[arg(long)]
        internal: Option<SocketAddr>,

        /// Metadata database directory
        #[arg(long)]
        db: Option<PathBuf>,

        /// Membership store gateway URL
        #[arg(long)]
        store_endpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            rest,
            internal,
            db,
            store_endpoint,
        } => {
            // File and environment first, CLI arguments win
            let mut config = Config::load(config.as_deref())?;
            if let Some(rest) = rest {
                config.rest_addr = rest;
            }
            if let Some(internal) = internal {
                config.internal_addr = internal;
            }
            if let Some(db) = db {
                config.store.db_path = db;
            }
            if store_endpoint.is_some() {
                config.store.endpoint = store_endpoint;
            }

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            let server = NodeServer::new(config)?;
            server.serve().await?;
        }
    }

    Ok(())
}
