//! Peer store: who each known peer is and which link reaches it.
//!
//! Slots are appended and never removed, so a [`PeerId`] handed out at dial
//! time stays valid for the lifetime of the store and can be round-tripped
//! through the handshake. A peer that leaves is marked
//! [`PeerState::Closed`] and stays in place.
//!
//! All mutations take the write lock; lookups take the read lock.

use crate::error::{BrokerError, BrokerResult};
use chrono::{DateTime, Utc};
use skiff_wire::Connection;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Lifecycle state of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Slot allocated, handshake not acknowledged yet.
    Down,
    /// Handshake complete; usable for sends.
    Up,
    /// Peer left, or this node is shutting down.
    Closed,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Down => "down",
            Self::Up => "up",
            Self::Closed => "closed",
        };
        f.pad(s)
    }
}

/// Positional slot index, issued when this node dials a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(usize);

impl PeerId {
    /// Value carried in `connect` / `connect-ack`.
    pub fn to_wire(self) -> u64 {
        self.0 as u64
    }

    pub fn from_wire(id: u64) -> Option<Self> {
        usize::try_from(id).ok().map(Self)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Peer {
    /// Logical name; empty until the handshake completes.
    name: String,
    /// Address this node dialed, if it initiated.
    addr: Option<String>,
    /// Address the peer's frames arrive from.
    recv_addr: Option<String>,
    /// Link to the peer; detached once the slot is `Closed`.
    conn: Option<Arc<Connection>>,
    state: PeerState,
    updated_at: DateTime<Utc>,
}

impl Peer {
    fn set_state(&mut self, state: PeerState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// Diagnostic copy of one peer slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub id: PeerId,
    pub name: String,
    pub addr: Option<String>,
    pub recv_addr: Option<String>,
    pub connection_id: Option<u64>,
    pub state: PeerState,
    pub updated_at: DateTime<Utc>,
}

/// Thread-safe store of peer slots.
#[derive(Default)]
pub struct PeerStore {
    peers: RwLock<Vec<Peer>>,
}

impl PeerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a `Down` slot for a peer this node is dialing.
    pub fn add_dialed(&self, addr: &str, conn: Arc<Connection>) -> PeerId {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        peers.push(Peer {
            name: String::new(),
            addr: Some(addr.to_string()),
            recv_addr: None,
            conn: Some(conn),
            state: PeerState::Down,
            updated_at: Utc::now(),
        });
        PeerId(peers.len() - 1)
    }

    /// Record an inbound `connect`: update the first slot carrying `name`, or
    /// append a new one. Either way the slot ends up `Up` on `conn`.
    pub fn upsert_inbound(
        &self,
        name: &str,
        recv_addr: &str,
        conn: Arc<Connection>,
    ) -> (PeerId, Arc<Connection>) {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        if let Some((index, peer)) = peers.iter_mut().enumerate().find(|(_, p)| p.name == name) {
            peer.conn = Some(Arc::clone(&conn));
            peer.recv_addr = Some(recv_addr.to_string());
            peer.set_state(PeerState::Up);
            return (PeerId(index), conn);
        }

        peers.push(Peer {
            name: name.to_string(),
            addr: None,
            recv_addr: Some(recv_addr.to_string()),
            conn: Some(Arc::clone(&conn)),
            state: PeerState::Up,
            updated_at: Utc::now(),
        });
        (PeerId(peers.len() - 1), conn)
    }

    /// Record a `connect-ack` for slot `id`.
    ///
    /// Returns `None` when the slot does not exist, already belongs to a
    /// differently named peer, or has lost its link to a `leave`.
    pub fn acknowledge(&self, id: PeerId, name: &str, recv_addr: &str) -> Option<Arc<Connection>> {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        let peer = peers.get_mut(id.0)?;
        if !peer.name.is_empty() && peer.name != name {
            return None;
        }
        let conn = peer.conn.clone()?;
        peer.name = name.to_string();
        peer.recv_addr = Some(recv_addr.to_string());
        peer.set_state(PeerState::Up);
        Some(conn)
    }

    /// Mark every slot named `name` as `Closed` and detach their
    /// connections, handing them back for closing.
    ///
    /// Empty when no slot with that name still holds a link. The slots stay
    /// in place; only the links are released.
    pub fn mark_leaving(&self, name: &str) -> Vec<Arc<Connection>> {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        peers
            .iter_mut()
            .filter(|p| p.name == name)
            .filter_map(|p| {
                p.set_state(PeerState::Closed);
                p.conn.take()
            })
            .collect()
    }

    /// Move every `Up` slot to `Closed` and detach its connection,
    /// returning the connections that should be told we are leaving.
    pub fn mark_closing(&self) -> Vec<Arc<Connection>> {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        peers
            .iter_mut()
            .filter(|p| p.state == PeerState::Up)
            .filter_map(|p| {
                p.set_state(PeerState::Closed);
                p.conn.take()
            })
            .collect()
    }

    /// Resolve `name` to a connection usable for sending.
    ///
    /// An `Up` slot wins over stale slots with the same name.
    pub fn connection_for(&self, name: &str) -> BrokerResult<Arc<Connection>> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        let mut stale = None;
        for peer in peers.iter().filter(|p| p.name == name) {
            if let (PeerState::Up, Some(conn)) = (peer.state, &peer.conn) {
                return Ok(Arc::clone(conn));
            }
            stale.get_or_insert(peer.state);
        }
        match stale {
            Some(state) => Err(BrokerError::PeerNotUp {
                name: name.to_string(),
                state,
            }),
            None => Err(BrokerError::PeerNotFound(name.to_string())),
        }
    }

    /// Best state among the slots named `name` (`Up` > `Down` > `Closed`).
    pub fn state_of(&self, name: &str) -> Option<PeerState> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers
            .iter()
            .filter(|p| p.name == name)
            .map(|p| p.state)
            .min_by_key(|s| match s {
                PeerState::Up => 0,
                PeerState::Down => 1,
                PeerState::Closed => 2,
            })
    }

    /// State of slot `id`.
    pub fn state_by_id(&self, id: PeerId) -> Option<PeerState> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.get(id.0).map(|p| p.state)
    }

    /// Copy of every slot, in slot order.
    pub fn snapshot(&self) -> Vec<PeerSnapshot> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers
            .iter()
            .enumerate()
            .map(|(i, p)| PeerSnapshot {
                id: PeerId(i),
                name: p.name.clone(),
                addr: p.addr.clone(),
                recv_addr: p.recv_addr.clone(),
                connection_id: p.conn.as_ref().map(|c| c.id()),
                state: p.state,
                updated_at: p.updated_at,
            })
            .collect()
    }

    /// Number of slots, closed ones included.
    pub fn len(&self) -> usize {
        self.peers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_types::TransportConfig;
    use skiff_wire::MessageServer;

    async fn server() -> MessageServer {
        MessageServer::bind("127.0.0.1:0", TransportConfig::default())
            .await
            .unwrap()
    }

    /// Real loopback connections from one local server to `n` targets.
    async fn connections(n: usize) -> (MessageServer, Vec<MessageServer>, Vec<Arc<Connection>>) {
        let local = server().await;
        let mut targets = Vec::new();
        let mut conns = Vec::new();
        for _ in 0..n {
            let target = server().await;
            conns.push(
                local
                    .open_connection(&target.local_addr().to_string())
                    .await
                    .unwrap(),
            );
            targets.push(target);
        }
        (local, targets, conns)
    }

    #[tokio::test]
    async fn test_dial_then_ack() {
        let (_local, _targets, conns) = connections(1).await;
        let store = PeerStore::new();

        let id = store.add_dialed("10.0.0.2:7000", Arc::clone(&conns[0]));
        assert_eq!(id.index(), 0);
        assert_eq!(store.state_by_id(id), Some(PeerState::Down));
        assert!(store.state_of("beta").is_none());

        let conn = store.acknowledge(id, "beta", "10.0.0.2:7000").unwrap();
        assert!(Arc::ptr_eq(&conn, &conns[0]));
        assert_eq!(store.state_of("beta"), Some(PeerState::Up));

        let snap = &store.snapshot()[0];
        assert_eq!(snap.name, "beta");
        assert_eq!(snap.addr.as_deref(), Some("10.0.0.2:7000"));
        assert_eq!(snap.recv_addr.as_deref(), Some("10.0.0.2:7000"));
        assert_eq!(snap.connection_id, Some(conns[0].id()));
    }

    #[tokio::test]
    async fn test_ack_correlation_failures() {
        let (_local, _targets, conns) = connections(1).await;
        let store = PeerStore::new();
        let id = store.add_dialed("a", Arc::clone(&conns[0]));

        // Unknown slot.
        assert!(store
            .acknowledge(PeerId::from_wire(5).unwrap(), "beta", "a")
            .is_none());

        assert!(store.acknowledge(id, "beta", "a").is_some());
        // Same slot claimed by a different name.
        assert!(store.acknowledge(id, "gamma", "a").is_none());
        assert_eq!(store.snapshot()[0].name, "beta");
        // Re-ack under the same name is fine.
        assert!(store.acknowledge(id, "beta", "a").is_some());
    }

    #[tokio::test]
    async fn test_upsert_inbound_updates_by_name() {
        let (_local, _targets, conns) = connections(2).await;
        let store = PeerStore::new();

        let (first, _) = store.upsert_inbound("beta", "b:1", Arc::clone(&conns[0]));
        let (again, conn) = store.upsert_inbound("beta", "b:2", Arc::clone(&conns[1]));
        assert_eq!(first, again);
        assert!(Arc::ptr_eq(&conn, &conns[1]));
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot()[0].recv_addr.as_deref(), Some("b:2"));
        assert!(store.snapshot()[0].addr.is_none());
    }

    #[tokio::test]
    async fn test_upsert_does_not_claim_unnamed_dial_slot() {
        let (_local, _targets, conns) = connections(2).await;
        let store = PeerStore::new();

        let dialed = store.add_dialed("b", Arc::clone(&conns[0]));
        let (inbound, _) = store.upsert_inbound("beta", "b:9", Arc::clone(&conns[1]));
        assert_ne!(dialed, inbound);
        assert_eq!(store.state_by_id(dialed), Some(PeerState::Down));
        assert_eq!(store.state_by_id(inbound), Some(PeerState::Up));
    }

    #[tokio::test]
    async fn test_connection_for() {
        let (_local, _targets, conns) = connections(1).await;
        let store = PeerStore::new();

        assert!(matches!(
            store.connection_for("beta"),
            Err(BrokerError::PeerNotFound(_))
        ));

        store.upsert_inbound("beta", "b", Arc::clone(&conns[0]));
        assert!(store.connection_for("beta").is_ok());

        store.mark_leaving("beta");
        match store.connection_for("beta") {
            Err(BrokerError::PeerNotUp { name, state }) => {
                assert_eq!(name, "beta");
                assert_eq!(state, PeerState::Closed);
            }
            other => panic!("Expected PeerNotUp, got {:?}", other.map(|c| c.id())),
        }
    }

    #[tokio::test]
    async fn test_mark_closing_only_touches_up_peers() {
        let (_local, _targets, conns) = connections(3).await;
        let store = PeerStore::new();

        let down = store.add_dialed("x", Arc::clone(&conns[0]));
        store.upsert_inbound("beta", "b", Arc::clone(&conns[1]));
        store.upsert_inbound("gamma", "g", Arc::clone(&conns[2]));
        store.mark_leaving("gamma");

        let closing = store.mark_closing();
        assert_eq!(closing.len(), 1);
        assert!(Arc::ptr_eq(&closing[0], &conns[1]));
        assert_eq!(store.state_by_id(down), Some(PeerState::Down));
        assert_eq!(store.state_of("beta"), Some(PeerState::Closed));

        // Slots are never removed.
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_leave_releases_connection() {
        let (_local, _targets, conns) = connections(1).await;
        let store = PeerStore::new();
        let id = store.add_dialed("b", Arc::clone(&conns[0]));
        store.acknowledge(id, "beta", "b").unwrap();

        let held = Arc::strong_count(&conns[0]);
        let released = store.mark_leaving("beta");
        assert_eq!(released.len(), 1);
        drop(released);
        assert_eq!(Arc::strong_count(&conns[0]), held - 1);
        assert_eq!(store.snapshot()[0].connection_id, None);
        assert_eq!(store.state_by_id(id), Some(PeerState::Closed));

        // Already detached: nothing more to hand back, and a late ack cannot
        // bring the slot up without a link.
        assert!(store.mark_leaving("beta").is_empty());
        assert!(store.acknowledge(id, "beta", "b").is_none());

        // An inbound connect re-attaches the same slot.
        let (revived, conn) = store.upsert_inbound("beta", "b:2", Arc::clone(&conns[0]));
        assert_eq!(revived, id);
        assert!(Arc::ptr_eq(&conn, &conns[0]));
        assert_eq!(store.snapshot()[0].connection_id, Some(conns[0].id()));
    }

    #[tokio::test]
    async fn test_mark_closing_detaches_connections() {
        let (_local, _targets, conns) = connections(1).await;
        let store = PeerStore::new();
        store.upsert_inbound("beta", "b", Arc::clone(&conns[0]));

        assert_eq!(store.mark_closing().len(), 1);
        assert_eq!(store.snapshot()[0].connection_id, None);
        assert!(store.mark_closing().is_empty());
    }

    #[tokio::test]
    async fn test_leave_unknown_peer() {
        let store = PeerStore::new();
        assert!(store.mark_leaving("nobody").is_empty());
    }
}
