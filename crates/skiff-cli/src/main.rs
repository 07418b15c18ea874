//! skiff CLI: run a broker node, send a one-off message, inspect peers.

mod cli;
mod cmd;
mod ui;

use crate::cli::{Cli, Commands};
use clap::Parser;

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    match cli.command {
        Commands::Run { config } => cmd::node::cmd_run(&config),
        Commands::Send {
            config,
            node,
            queue,
            text,
            wait_ms,
        } => cmd::node::cmd_send(&config, &node, &queue, &text, wait_ms),
        Commands::Peers { config, wait_ms } => cmd::node::cmd_peers(&config, wait_ms),
        Commands::ConfigTemplate => cmd::config::cmd_config_template(),
    }
}
