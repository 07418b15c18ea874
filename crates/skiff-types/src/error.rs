//! Configuration error types.

use thiserror::Error;

/// Errors raised while building or loading a [`crate::NodeConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required option was not supplied.
    #[error("Missing required option '{0}'")]
    Missing(&'static str),

    /// An option was supplied with the wrong type.
    #[error("Invalid format for option '{0}'")]
    InvalidFormat(&'static str),

    /// The options were well-formed but semantically invalid.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The config file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for a node config.
    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
