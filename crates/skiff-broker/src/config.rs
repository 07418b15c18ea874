//! Node configuration loading from a TOML file.

use skiff_types::error::ConfigResult;
use skiff_types::NodeConfig;
use std::path::Path;
use tracing::info;

/// Load and validate a node configuration from `path`.
pub fn load_config(path: &Path) -> ConfigResult<NodeConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config: NodeConfig = toml::from_str(&contents)?;
    config.validate()?;
    info!(
        path = %path.display(),
        node = %config.own_name,
        peers = config.addrs.len(),
        queues = config.queues.len(),
        "Loaded configuration"
    );
    Ok(config)
}
