pub mod config;
pub mod node;

use crate::ui;
use skiff_broker::Broker;
use skiff_types::NodeConfig;
use std::path::Path;

/// Build a multi-threaded runtime or exit.
pub(crate) fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        ui::error(&format!("Failed to start async runtime: {e}"));
        std::process::exit(1);
    })
}

/// Load and validate a config file or exit with a hint.
pub(crate) fn load_or_exit(path: &Path) -> NodeConfig {
    skiff_broker::load_config(path).unwrap_or_else(|e| {
        ui::error_with_fix(
            &format!("Cannot use config {}: {e}", path.display()),
            "Run `skiff config-template` for a working example",
        );
        std::process::exit(1);
    })
}

pub(crate) async fn start_or_exit(config: NodeConfig) -> Broker<Vec<u8>> {
    let addr = config.own_addr.clone();
    Broker::start_raw(config).await.unwrap_or_else(|e| {
        ui::error(&format!("Failed to start node on {addr}: {e}"));
        std::process::exit(1);
    })
}
