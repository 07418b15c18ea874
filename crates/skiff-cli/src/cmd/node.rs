//! Commands that start a broker node: `run`, `send` and `peers`.

use crate::ui;
use colored::Colorize;
use skiff_broker::{PeerSnapshot, PeerState};
use skiff_queue::BoundedQueue;
use skiff_types::NodeConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub fn cmd_run(config_path: &Path) {
    let config = super::load_or_exit(config_path);
    let rt = super::runtime();
    rt.block_on(async {
        let queues = config.queues.clone();
        let broker = super::start_or_exit(config).await;

        ui::section(&format!("Node {}", broker.own_name()));
        ui::kv("Listening", &broker.local_addr().to_string());
        for q in &queues {
            let Some(queue) = BoundedQueue::new(q.capacity) else {
                warn!(queue = %q.name, "Skipping queue with zero capacity");
                continue;
            };
            let queue = Arc::new(queue);
            if let Err(e) = broker.register_queue(&q.name, Arc::clone(&queue)).await {
                ui::error(&format!("Failed to register queue {}: {e}", q.name));
                std::process::exit(1);
            }
            spawn_drainer(q.name.clone(), queue);
            ui::kv("Queue", &format!("{} (capacity {})", q.name, q.capacity));
        }
        ui::blank();
        ui::hint("Press Ctrl+C to leave the mesh");

        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler failed, shutting down");
        }
        broker.close().await;
        ui::success("Left all peers");
    });
}

/// Log every item that lands in `queue` from a dedicated thread.
fn spawn_drainer(name: String, queue: Arc<BoundedQueue<Vec<u8>>>) {
    let spawned = std::thread::Builder::new()
        .name(format!("drain-{name}"))
        .spawn(move || loop {
            let item = queue.get();
            info!(
                queue = %name,
                bytes = item.len(),
                text = %String::from_utf8_lossy(&item),
                "Received"
            );
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Failed to start drainer thread");
    }
}

pub fn cmd_send(config_path: &Path, node: &str, queue: &str, text: &str, wait_ms: u64) {
    let config = ephemeral(super::load_or_exit(config_path));
    let rt = super::runtime();
    let result = rt.block_on(async {
        let broker = super::start_or_exit(config).await;
        let up = wait_for(Duration::from_millis(wait_ms), || {
            broker.peer_state(node) == Some(PeerState::Up)
        })
        .await;
        if !up {
            warn!(node = %node, wait_ms, "Target did not come up in time");
        }
        let result = broker.send(node, queue, text.as_bytes().to_vec()).await;
        broker.close().await;
        result
    });

    match result {
        Ok(()) => ui::success(&format!("Sent {} bytes to {node}/{queue}", text.len())),
        Err(e) => {
            ui::error_with_fix(
                &format!("Send failed: {e}"),
                "Check that the node is running and reachable through `addrs`",
            );
            std::process::exit(1);
        }
    }
}

pub fn cmd_peers(config_path: &Path, wait_ms: u64) {
    let config = ephemeral(super::load_or_exit(config_path));
    let rt = super::runtime();
    let peers = rt.block_on(async {
        let broker = super::start_or_exit(config).await;
        wait_for(Duration::from_millis(wait_ms), || {
            let peers = broker.peers();
            !peers.is_empty() && peers.iter().all(|p| p.state == PeerState::Up)
        })
        .await;
        let peers = broker.peers();
        broker.close().await;
        peers
    });

    ui::section("Peers");
    print_peers(&peers);
}

fn print_peers(peers: &[PeerSnapshot]) {
    if peers.is_empty() {
        ui::hint("No peer answered. Unreachable addresses are skipped at startup.");
        return;
    }
    let header = format!("{:<4} {:<20} {:<24} {:<6} {}", "ID", "NAME", "ADDR", "STATE", "SINCE");
    println!("  {}", header.bold());
    for p in peers {
        let name = if p.name.is_empty() { "-" } else { p.name.as_str() };
        let addr = p.addr.as_deref().or(p.recv_addr.as_deref()).unwrap_or("-");
        println!(
            "  {:<4} {:<20} {:<24} {} {}",
            p.id.to_string(),
            name,
            addr,
            ui::state_label(p.state),
            p.updated_at.format("%H:%M:%S")
        );
    }
}

/// Throwaway identity for one-shot commands, so they never collide with
/// the node the config describes.
fn ephemeral(config: NodeConfig) -> NodeConfig {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    NodeConfig {
        own_name: format!("{}-{}", config.own_name, &suffix[..8]),
        own_addr: "0.0.0.0:0".to_string(),
        queues: Vec::new(),
        ..config
    }
}

async fn wait_for<F: FnMut() -> bool>(limit: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_types::QueueConfig;

    #[test]
    fn test_ephemeral_identity() {
        let mut config = NodeConfig::new("alpha", "127.0.0.1:7400").with_peers(["127.0.0.1:7401"]);
        config.queues.push(QueueConfig {
            name: "jobs".into(),
            capacity: 4,
        });

        let a = ephemeral(config.clone());
        let b = ephemeral(config);
        assert!(a.own_name.starts_with("alpha-"));
        assert_ne!(a.own_name, b.own_name);
        assert_eq!(a.own_addr, "0.0.0.0:0");
        assert_eq!(a.addrs, vec!["127.0.0.1:7401".to_string()]);
        assert!(a.queues.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_gives_up() {
        let mut calls = 0;
        let ok = wait_for(Duration::from_millis(60), || {
            calls += 1;
            false
        })
        .await;
        assert!(!ok);
        assert!(calls >= 2);
        assert!(wait_for(Duration::ZERO, || true).await);
    }
}
