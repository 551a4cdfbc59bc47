//! CLI for cluster operations

use anyhow::Context;
use brickmgr::commands::{BrickRequest, CreateVolumeRequest};
use brickmgr::ops::AdminClient;
use brickmgr::store::Volume;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "brickmgr")]
#[command(about = "brickmgr cluster management CLI")]
#[command(version)]
struct Cli {
    /// Node admin API URL
    #[arg(long, default_value = "http://localhost:24007")]
    node: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Peer management
    Peer {
        #[command(subcommand)]
        command: PeerCommands,
    },

    /// Volume management
    Volume {
        #[command(subcommand)]
        command: VolumeCommands,
    },
}

#[derive(Subcommand)]
enum PeerCommands {
    /// Remove a peer from the cluster
    Delete {
        /// Peer UUID
        peerid: String,
    },

    /// List known peers
    List,
}

#[derive(Subcommand)]
enum VolumeCommands {
    /// Record a new volume
    Create {
        name: String,

        /// Brick as <node-uuid>:<hostname>:<path>, repeatable
        #[arg(long = "brick", required = true)]
        bricks: Vec<String>,
    },

    /// Start the volume's brick processes
    Start { name: String },

    /// Stop the volume's brick processes
    Stop { name: String },

    /// Show a volume
    Info { name: String },

    /// List volumes
    List,
}

fn parse_brick(arg: &str) -> anyhow::Result<BrickRequest> {
    let mut parts = arg.splitn(3, ':');
    let (Some(node), Some(hostname), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
        anyhow::bail!("brick {} is not <node-uuid>:<hostname>:<path>", arg);
    };
    Ok(BrickRequest {
        node_id: node.parse().with_context(|| format!("invalid node id in brick {}", arg))?,
        hostname: hostname.to_string(),
        path: path.to_string(),
    })
}

fn print_volume(vol: &Volume) {
    println!("Volume: {}", vol.name);
    println!("  ID: {}", vol.id);
    println!("  Status: {}", vol.status);
    println!("  Bricks:");
    for brick in &vol.bricks {
        println!("    {} ({})", brick.display_name(), brick.node_id);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = AdminClient::new(&cli.node);

    match cli.command {
        Commands::Peer { command } => match command {
            PeerCommands::Delete { peerid } => {
                client.delete_peer(&peerid).await?;
                println!("Peer {} deleted", peerid);
            }
            PeerCommands::List => {
                for peer in client.list_peers().await? {
                    println!("{}  {}  {}", peer.id, peer.name, peer.addresses.join(","));
                }
            }
        },

        Commands::Volume { command } => match command {
            VolumeCommands::Create { name, bricks } => {
                let bricks = bricks
                    .iter()
                    .map(|b| parse_brick(b))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                let vol = client
                    .create_volume(&CreateVolumeRequest { name, bricks })
                    .await?;
                print_volume(&vol);
            }
            VolumeCommands::Start { name } => {
                let vol = client.start_volume(&name).await?;
                println!("Volume {} started", vol.name);
            }
            VolumeCommands::Stop { name } => {
                let vol = client.stop_volume(&name).await?;
                println!("Volume {} stopped", vol.name);
            }
            VolumeCommands::Info { name } => {
                print_volume(&client.volume_info(&name).await?);
            }
            VolumeCommands::List => {
                for vol in client.list_volumes().await? {
                    println!("{}  {}  {} bricks", vol.name, vol.status, vol.bricks.len());
                }
            }
        },
    }

    Ok(())
}
