//! `skiff config-template`.

pub const CONFIG_TEMPLATE: &str = r#"# skiff node configuration

# Name peers use to address this node.
own-name = "alpha"

# Address the node listens on.
own-addr = "127.0.0.1:7400"

# Peers dialed at startup. Unreachable peers are skipped.
addrs = ["127.0.0.1:7401"]

[transport]
# Inbound frames buffered across all connections before new ones are dropped.
inbox-capacity = 256
# Largest accepted frame in bytes.
max-frame-size = 16777216

# Queues registered by `skiff run`. Items beyond capacity are dropped.
[[queues]]
name = "jobs"
capacity = 64
"#;

pub fn cmd_config_template() {
    print!("{CONFIG_TEMPLATE}");
}
