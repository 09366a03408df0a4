//! CLI command definitions and handlers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod discover;
pub mod receive;
pub mod send;

/// The process-wide configuration, loaded once on first use.
pub fn load_config() -> &'static ferry_core::config::Config {
    ferry_core::config::Config::global()
}

/// Ferry - Peer-to-peer bulk file transfer over LAN
#[derive(Parser)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Send a file to a peer
    Send(SendArgs),

    /// Listen for an incoming file
    Receive(ReceiveArgs),

    /// Find other peers on the LAN
    Discover(DiscoverArgs),
}

/// Arguments for the send command
#[derive(clap::Args)]
pub struct SendArgs {
    /// File to send
    pub file: PathBuf,

    /// Peer to send to: a discovered hostname, HOST, IP, or IP:PORT
    pub peer: String,
}

/// Arguments for the receive command
#[derive(clap::Args)]
pub struct ReceiveArgs {
    /// UDP port to listen on (default: 8080)
    pub port: Option<u16>,
}

/// Arguments for the discover command
#[derive(clap::Args)]
pub struct DiscoverArgs {}
