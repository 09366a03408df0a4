//! Receive command implementation.

use anyhow::{Context, Result};

use ferry_core::discovery::{DiscoveryResponder, DISCOVERY_PORT};
use ferry_core::transfer::{Outcome, ReceiveSession, TransferConfig};

use super::send::print_summary;
use super::ReceiveArgs;

/// Run the receive command.
pub async fn run(args: ReceiveArgs) -> Result<()> {
    let config = super::load_config();
    let transfer_config = TransferConfig::from(config);
    let port = args.port.unwrap_or(config.network.port);

    let session = ReceiveSession::bind(port, transfer_config)
        .context("Failed to bind transfer port")?;

    // Answer discovery probes while we wait. Best-effort: another local
    // instance may already hold the discovery port.
    let responder = match DiscoveryResponder::spawn(DISCOVERY_PORT, port).await {
        Ok(responder) => Some(responder),
        Err(e) => {
            tracing::debug!("discovery responder unavailable: {e}");
            None
        }
    };

    println!("Listening for chunked transfers on port {port}...");

    let outcome = session.run().await.context("Transfer failed")?;
    drop(responder);

    match outcome {
        Outcome::Completed(report) => {
            print_summary("received", &report);
            Ok(())
        }
        Outcome::Rejected { reason } => {
            println!("Transfer rejected: {reason}");
            Ok(())
        }
    }
}
