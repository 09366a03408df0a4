//! Discover command implementation.

use anyhow::{Context, Result};

use ferry_core::discovery::{self, DISCOVERY_PORT, REPLY_TIMEOUT};

use super::DiscoverArgs;

/// Run the discover command.
pub async fn run(_args: DiscoverArgs) -> Result<()> {
    println!("Discovering peers on the network...");

    let peers = discovery::discover_peers(DISCOVERY_PORT, REPLY_TIMEOUT)
        .await
        .context("Peer discovery failed")?;

    if peers.is_empty() {
        println!("No other peers found on the network.");
        return Ok(());
    }

    println!("Available peers:");
    for peer in peers {
        println!("  - {} ({})", peer.hostname, peer.addr);
    }

    Ok(())
}
