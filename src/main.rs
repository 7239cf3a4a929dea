//! kadnode CLI application

use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;
use kadnode::{Node, NodeConfig, Result};

#[derive(Parser, Debug)]
#[command(name = "kadnode", version, about = "Kademlia-style DHT overlay node")]
struct Args {
    /// Overlay port shared by every node in the network
    #[arg(short, long, default_value_t = kadnode::config::DEFAULT_PORT)]
    port: u16,

    /// Bootstrap peer address; repeat for multiple peers
    #[arg(short, long = "bootstrap")]
    bootstrap: Vec<String>,

    /// Reachable address to bind and advertise; probed from the default
    /// route when omitted
    #[arg(long)]
    addr: Option<IpAddr>,

    /// Periodically print the non-empty routing buckets
    #[arg(long)]
    show_table: bool,

    /// Set the verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    use tracing_subscriber::{fmt, EnvFilter};
    fmt()
        .with_env_filter(EnvFilter::new(&args.verbosity))
        .init();

    let config = NodeConfig {
        port: args.port,
        bootstrap_peers: args.bootstrap,
        addr: args.addr,
        ..NodeConfig::default()
    };

    let node = Node::start(config).await?;

    if args.show_table {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = tokio::time::sleep(Duration::from_secs(5)) => {
                    let rendered = node.show_table().await;
                    if !rendered.is_empty() {
                        println!("{rendered}");
                    }
                }
            }
        }
    } else {
        tokio::signal::ctrl_c().await?;
    }

    tracing::info!("shutting down");
    Ok(())
}
