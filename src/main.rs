use clap::{Parser, Subcommand};
use log::{error, info};

use chain_gossip::network::{NetworkActor, NetworkEvent};
use chain_gossip::NetworkConfig;

#[derive(Parser)]
#[command(name = "gossip-node")]
#[command(about = "Block and transaction gossip relay node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Start {
        #[arg(long, default_value = "/ip4/0.0.0.0/tcp/30333")]
        listen: String,
        /// Peer multiaddr to dial on startup, may be repeated
        #[arg(long = "bootstrap")]
        bootstrap_peers: Vec<String>,
        /// Hex-encoded ed25519 secret key
        #[arg(long)]
        secret_key: Option<String>,
        #[arg(long)]
        no_mdns: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            listen,
            bootstrap_peers,
            secret_key,
            no_mdns,
        } => {
            let config = NetworkConfig {
                listen_addr: listen,
                secret_key,
                bootstrap_peers,
                enable_mdns: !no_mdns,
                ..NetworkConfig::default()
            };
            start_node(config).await?;
        }
    }

    Ok(())
}

async fn start_node(config: NetworkConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (actor, handle, mut events) = NetworkActor::new(config)?;
    println!("🚀 Starting gossip node {}", actor.local_peer_id());

    let network = tokio::spawn(actor.run());

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutting down");
                break;
            }
        }
    }

    drop(handle);
    match network.await? {
        Ok(()) => info!("✅ Network stopped"),
        Err(e) => error!("❌ Network stopped with error: {}", e),
    }
    Ok(())
}

fn log_event(event: &NetworkEvent) {
    match event {
        NetworkEvent::BlockReceived { peer_id, block } => {
            info!(
                "🧱 Block #{} ({}) from {}",
                block.height(),
                block.hash().short(),
                peer_id
            );
        }
        NetworkEvent::TransactionReceived {
            peer_id,
            transaction,
        } => {
            info!(
                "💸 Transaction {} from {}",
                transaction.hash().short(),
                peer_id
            );
        }
        NetworkEvent::StatusReceived {
            peer_id,
            height,
            best_hash,
        } => {
            info!(
                "📊 Peer {} at height {} ({})",
                peer_id,
                height,
                best_hash.short()
            );
        }
        NetworkEvent::BlocksRequested {
            peer_id,
            start_height,
            count,
        } => {
            info!(
                "📨 Peer {} asked for {} block(s) from #{}",
                peer_id, count, start_height
            );
        }
    }
}
