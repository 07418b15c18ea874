//! Clap CLI definitions for skiff.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  skiff config-template > node.toml     Write a starter config
  skiff run --config node.toml          Run a node and drain its queues
  skiff peers --config node.toml        Show the handshake state of every peer
  skiff send --config node.toml --node beta --queue jobs \"hello\"

\x1b[1mHint:\x1b[0m Set RUST_LOG=debug to see per-message drops.";

/// skiff: a small peer-to-peer message broker.
#[derive(Parser, Debug)]
#[command(
    name = "skiff",
    version,
    about = "skiff: peer-to-peer delivery into named bounded queues",
    after_help = AFTER_HELP,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a node: register the configured queues and log what arrives.
    Run {
        /// Path to the node config file.
        #[arg(long)]
        config: PathBuf,
    },
    /// Send one UTF-8 message to a queue on a peer, then leave.
    Send {
        /// Path to a config whose `addrs` reach the target node.
        #[arg(long)]
        config: PathBuf,
        /// Name of the target node.
        #[arg(long)]
        node: String,
        /// Name of the queue on the target node.
        #[arg(long)]
        queue: String,
        /// Message text.
        text: String,
        /// How long to wait for the target to come up, in milliseconds.
        #[arg(long, default_value_t = 3000)]
        wait_ms: u64,
    },
    /// Dial the configured peers and print their handshake state.
    Peers {
        /// Path to the node config file.
        #[arg(long)]
        config: PathBuf,
        /// How long to wait for handshakes, in milliseconds.
        #[arg(long, default_value_t = 1000)]
        wait_ms: u64,
    },
    /// Print a commented config template.
    ConfigTemplate,
}
