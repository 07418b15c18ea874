//! Node configuration.
//!
//! A [`NodeConfig`] can come from two places: a TOML file (see
//! `skiff_broker::config::load_config`) or an options map handed over by an
//! embedding layer. Both use the same kebab-case key names (`own-name`,
//! `own-addr`, `addrs`).

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Default buffer size of the shared inbound message channel.
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// Default upper bound for a single frame (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Configuration of one broker node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeConfig {
    /// Logical name of this node. Peers address it by this name.
    pub own_name: String,
    /// Address the local transport server binds to.
    pub own_addr: String,
    /// Static peer addresses dialed at startup, in order.
    #[serde(default)]
    pub addrs: Vec<String>,
    /// Transport tuning.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Queues registered by the `skiff` binary at startup.
    #[serde(default)]
    pub queues: Vec<QueueConfig>,
}

/// Transport tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TransportConfig {
    /// Buffer size of the inbound channel shared by all connections.
    /// Frames arriving while it is full are dropped.
    pub inbox_capacity: usize,
    /// Largest accepted frame, terminator excluded.
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// A named queue and its fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    pub capacity: usize,
}

impl NodeConfig {
    /// Build a config with no peers, default transport settings and no queues.
    pub fn new(own_name: impl Into<String>, own_addr: impl Into<String>) -> Self {
        Self {
            own_name: own_name.into(),
            own_addr: own_addr.into(),
            addrs: Vec::new(),
            transport: TransportConfig::default(),
            queues: Vec::new(),
        }
    }

    /// Builder-style setter for the static peer list.
    pub fn with_peers<I, S>(mut self, addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addrs = addrs.into_iter().map(Into::into).collect();
        self
    }

    /// Build a config from an options map.
    ///
    /// `own-name`, `own-addr` and `addrs` are required. `transport` and
    /// `queues` are optional and follow the TOML layout. Other keys are ignored.
    pub fn from_options(options: &Map<String, Value>) -> ConfigResult<Self> {
        let own_name = required_str(options, "own-name")?;
        let own_addr = required_str(options, "own-addr")?;

        let addrs = match options.get("addrs") {
            None => return Err(ConfigError::Missing("addrs")),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(String::from)
                        .ok_or(ConfigError::InvalidFormat("addrs"))
                })
                .collect::<ConfigResult<Vec<_>>>()?,
            Some(_) => return Err(ConfigError::InvalidFormat("addrs")),
        };

        let transport = match options.get("transport") {
            None => TransportConfig::default(),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|_| ConfigError::InvalidFormat("transport"))?,
        };

        let queues = match options.get("queues") {
            None => Vec::new(),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|_| ConfigError::InvalidFormat("queues"))?,
        };

        let config = Self {
            own_name,
            own_addr,
            addrs,
            transport,
            queues,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check semantic constraints that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.own_name.is_empty() {
            return Err(ConfigError::Invalid("own-name must not be empty".into()));
        }
        if self.own_addr.is_empty() {
            return Err(ConfigError::Invalid("own-addr must not be empty".into()));
        }
        if self.transport.inbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "transport.inbox-capacity must be at least 1".into(),
            ));
        }
        if self.transport.max_frame_size == 0 {
            return Err(ConfigError::Invalid(
                "transport.max-frame-size must be at least 1".into(),
            ));
        }

        let mut seen = HashSet::new();
        for q in &self.queues {
            if q.name.is_empty() {
                return Err(ConfigError::Invalid("queue name must not be empty".into()));
            }
            if q.capacity == 0 {
                return Err(ConfigError::Invalid(format!(
                    "queue '{}' must have capacity of at least 1",
                    q.name
                )));
            }
            if !seen.insert(q.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "queue '{}' is declared more than once",
                    q.name
                )));
            }
        }
        Ok(())
    }
}

fn required_str(options: &Map<String, Value>, key: &'static str) -> ConfigResult<String> {
    match options.get(key) {
        None => Err(ConfigError::Missing(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ConfigError::InvalidFormat(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_from_options_minimal() {
        let config = NodeConfig::from_options(&options(json!({
            "own-name": "alpha",
            "own-addr": "127.0.0.1:7001",
            "addrs": ["127.0.0.1:7002", "127.0.0.1:7003"],
        })))
        .unwrap();

        assert_eq!(config.own_name, "alpha");
        assert_eq!(config.own_addr, "127.0.0.1:7001");
        assert_eq!(config.addrs, vec!["127.0.0.1:7002", "127.0.0.1:7003"]);
        assert_eq!(config.transport, TransportConfig::default());
        assert!(config.queues.is_empty());
    }

    #[test]
    fn test_from_options_missing_keys() {
        let err = NodeConfig::from_options(&options(json!({
            "own-addr": "127.0.0.1:7001",
            "addrs": [],
        })))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("own-name")));

        let err = NodeConfig::from_options(&options(json!({
            "own-name": "alpha",
            "addrs": [],
        })))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("own-addr")));

        let err = NodeConfig::from_options(&options(json!({
            "own-name": "alpha",
            "own-addr": "127.0.0.1:7001",
        })))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("addrs")));
    }

    #[test]
    fn test_from_options_wrong_types() {
        let err = NodeConfig::from_options(&options(json!({
            "own-name": "alpha",
            "own-addr": 7001,
            "addrs": [],
        })))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFormat("own-addr")));

        let err = NodeConfig::from_options(&options(json!({
            "own-name": "alpha",
            "own-addr": "127.0.0.1:7001",
            "addrs": ["127.0.0.1:7002", 5],
        })))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFormat("addrs")));
    }

    #[test]
    fn test_from_options_with_transport_and_queues() {
        let config = NodeConfig::from_options(&options(json!({
            "own-name": "alpha",
            "own-addr": "127.0.0.1:7001",
            "addrs": [],
            "transport": { "inbox-capacity": 8 },
            "queues": [{ "name": "jobs", "capacity": 4 }],
        })))
        .unwrap();

        assert_eq!(config.transport.inbox_capacity, 8);
        assert_eq!(config.transport.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(
            config.queues,
            vec![QueueConfig {
                name: "jobs".into(),
                capacity: 4
            }]
        );
    }

    #[test]
    fn test_validate_rejects_bad_queues() {
        let mut config = NodeConfig::new("alpha", "127.0.0.1:7001");
        config.queues.push(QueueConfig {
            name: "jobs".into(),
            capacity: 0,
        });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.queues[0].capacity = 2;
        config.queues.push(QueueConfig {
            name: "jobs".into(),
            capacity: 2,
        });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_toml_layout() {
        let text = r#"
            own-name = "alpha"
            own-addr = "127.0.0.1:7001"
            addrs = ["127.0.0.1:7002"]

            [transport]
            max-frame-size = 4096

            [[queues]]
            name = "jobs"
            capacity = 16
        "#;
        let config: NodeConfig = toml::from_str(text).unwrap();
        assert_eq!(config.own_name, "alpha");
        assert_eq!(config.transport.inbox_capacity, DEFAULT_INBOX_CAPACITY);
        assert_eq!(config.transport.max_frame_size, 4096);
        assert_eq!(config.queues.len(), 1);
        assert!(config.validate().is_ok());
    }
}
