//! Send command implementation.

use anyhow::{Context, Result};

use ferry_core::discovery::{self, DISCOVERY_PORT, REPLY_TIMEOUT};
use ferry_core::transfer::{format_size, Outcome, SendSession, TransferConfig, TransferReport};

use super::SendArgs;

/// Run the send command.
pub async fn run(args: SendArgs) -> Result<()> {
    let config = super::load_config();
    let transfer_config = TransferConfig::from(config);

    let endpoint = resolve_target(&args.peer).await?;

    let session = SendSession::new(&args.file, &endpoint, transfer_config)
        .await
        .context("Failed to create send session")?;

    match session.run().await.context("Transfer failed")? {
        Outcome::Completed(report) => {
            print_summary("sent", &report);
            Ok(())
        }
        Outcome::Rejected { reason } => {
            println!("Transfer rejected: {reason}");
            Ok(())
        }
    }
}

/// Turn the peer argument into an endpoint string.
///
/// Anything that looks like an address (`IP`, `IP:PORT`, `[IPv6]`, a name
/// with an explicit port) is used as-is; a bare name is first looked up
/// among discovered peers and otherwise left to DNS.
async fn resolve_target(peer: &str) -> Result<String> {
    let looks_like_address =
        peer.contains(':') || peer.parse::<std::net::IpAddr>().is_ok();
    if looks_like_address {
        return Ok(peer.to_string());
    }

    println!("Looking for '{peer}' on the network...");
    match discovery::discover_peers(DISCOVERY_PORT, REPLY_TIMEOUT).await {
        Ok(peers) => {
            if let Some(found) = peers.iter().find(|p| p.hostname == peer) {
                println!("Found {} at {}", found.hostname, found.addr);
                return Ok(found.addr.clone());
            }
            tracing::debug!("'{peer}' did not answer discovery, trying DNS");
        }
        Err(e) => tracing::debug!("discovery failed ({e}), trying DNS"),
    }

    Ok(peer.to_string())
}

/// Print the completion summary shared by both transfer directions.
pub fn print_summary(direction: &str, report: &TransferReport) {
    println!();
    println!("Transfer completed successfully!");
    println!("  File:     {}", report.filename);
    println!("  Size:     {}", format_size(report.filesize));
    println!(
        "  Chunks:   {} {direction} ({} moved this session)",
        report.chunks_planned,
        format_size(report.bytes_moved)
    );
    if report.retries > 0 {
        println!("  Retries:  {}", report.retries);
    }
    println!("  Duration: {:.2}s", report.duration.as_secs_f64());
    println!("  Speed:    {:.2} MiB/s", report.throughput_mib_s());
}
