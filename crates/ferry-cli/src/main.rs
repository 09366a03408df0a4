//! Ferry CLI - Peer-to-peer bulk file transfer over LAN
//!
//! ## Quick Start
//!
//! ```bash
//! # Receive a file (waits for a sender)
//! ferry receive
//!
//! # Send a file (on another device)
//! ferry send video.mkv 192.168.1.50
//! ```
//!
//! A rejected transfer exits with status 0; declining is a normal outcome.
//! Protocol, integrity, and I/O failures exit non-zero.

#![allow(clippy::doc_markdown)]

use anyhow::Result;
use clap::Parser;

mod commands;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Send(args) => commands::send::run(args).await,
        Command::Receive(args) => commands::receive::run(args).await,
        Command::Discover(args) => commands::discover::run(args).await,
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,ferry=info,ferry_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
