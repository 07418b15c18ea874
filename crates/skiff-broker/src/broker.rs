//! Broker: peer handshake and queue delivery.
//!
//! Startup binds the transport, spawns the receive and manager loops, then
//! dials every static peer address and sends `connect` with the slot id
//! allocated for it. The callee answers on the same link with `connect-ack`
//! echoing that id, which is how the dialer correlates the reply to its
//! slot before it knows the peer's name.
//!
//! The manager loop owns the queue registry outright. Registration and
//! delivery both reach it over channels, so there is no shared lock on the
//! registry.

use crate::codec::{PayloadDecoder, PayloadEncoder, RawBytes};
use crate::error::{BrokerError, BrokerResult};
use crate::registry::{PeerId, PeerSnapshot, PeerState, PeerStore};

use serde_json::{Map, Value};
use skiff_queue::BoundedQueue;
use skiff_types::NodeConfig;
use skiff_wire::{decode_message, encode_message, MessageServer, ProtocolMessage, WireError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Buffer of the registration and delivery channels feeding the manager.
const MANAGER_CHANNEL_CAPACITY: usize = 64;

/// Payload on its way to the manager loop.
#[derive(Debug)]
struct Delivery {
    qname: String,
    data: Vec<u8>,
}

enum RegistrationOp<T> {
    Add(Arc<BoundedQueue<T>>),
    Remove,
}

struct Registration<T> {
    name: String,
    op: RegistrationOp<T>,
    reply: oneshot::Sender<()>,
}

/// A running broker node.
///
/// `T` is the item type stored in local queues, produced from payload bytes
/// by the node's [`PayloadDecoder`]. Dropping the broker stops its
/// background tasks and its transport.
pub struct Broker<T: Send + 'static> {
    own_name: String,
    server: Arc<MessageServer>,
    peers: Arc<PeerStore>,
    registrations: mpsc::Sender<Registration<T>>,
    deliveries: mpsc::Sender<Delivery>,
    tasks: Vec<JoinHandle<()>>,
}

impl Broker<Vec<u8>> {
    /// Start a broker whose queues receive raw payload bytes.
    pub async fn start_raw(config: NodeConfig) -> BrokerResult<Self> {
        Self::start(config, Arc::new(RawBytes)).await
    }
}

impl<T: Send + 'static> Broker<T> {
    /// Start a broker from an options map (`own-name`, `own-addr`, `addrs`).
    pub async fn from_options(
        options: &Map<String, Value>,
        decoder: Arc<dyn PayloadDecoder<T>>,
    ) -> BrokerResult<Self> {
        let config = NodeConfig::from_options(options)?;
        Self::start(config, decoder).await
    }

    /// Bind the transport, start the background loops and dial static peers.
    ///
    /// Invalid options and bind failures are returned. Peers that cannot be
    /// dialed are logged and skipped.
    pub async fn start(config: NodeConfig, decoder: Arc<dyn PayloadDecoder<T>>) -> BrokerResult<Self> {
        config.validate()?;

        let server = Arc::new(MessageServer::bind(&config.own_addr, config.transport.clone()).await?);
        let peers = Arc::new(PeerStore::new());
        let (reg_tx, reg_rx) = mpsc::channel(MANAGER_CHANNEL_CAPACITY);
        let (del_tx, del_rx) = mpsc::channel(MANAGER_CHANNEL_CAPACITY);

        let manager = Manager {
            own_name: config.own_name.clone(),
            queues: HashMap::new(),
            decoder,
        };
        let manager_task = tokio::spawn(manager.run(reg_rx, del_rx));

        let receiver = Receiver {
            own_name: config.own_name.clone(),
            server: Arc::clone(&server),
            peers: Arc::clone(&peers),
            deliveries: del_tx.clone(),
        };
        let receive_task = tokio::spawn(receiver.run());

        info!(
            node = %config.own_name,
            addr = %server.local_addr(),
            peers = config.addrs.len(),
            "Broker started"
        );

        let broker = Self {
            own_name: config.own_name,
            server,
            peers,
            registrations: reg_tx,
            deliveries: del_tx,
            tasks: vec![manager_task, receive_task],
        };

        for addr in &config.addrs {
            broker.dial(addr).await;
        }

        Ok(broker)
    }

    /// Open a link to `addr`, allocate a `Down` slot and send `connect`.
    async fn dial(&self, addr: &str) {
        let conn = match self.server.open_connection(addr).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(addr = %addr, error = %e, "Connecting to peer failed");
                return;
            }
        };

        let id = self.peers.add_dialed(addr, Arc::clone(&conn));
        let connect = ProtocolMessage::Connect {
            name: self.own_name.clone(),
            id: id.to_wire(),
        };
        let frame = match encode_message(&connect) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(addr = %addr, error = %e, "Encoding connect failed");
                return;
            }
        };
        if let Err(e) = conn.send(&frame).await {
            warn!(addr = %addr, error = %e, "Initial connect send failed");
            return;
        }
        debug!(addr = %addr, id = %id, "Connect sent");
    }

    pub fn own_name(&self) -> &str {
        &self.own_name
    }

    /// Actual bound address of the transport.
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn transport(&self) -> &MessageServer {
        &self.server
    }

    /// Register `queue` under `name`, replacing any previous mapping.
    pub async fn register_queue(&self, name: &str, queue: Arc<BoundedQueue<T>>) -> BrokerResult<()> {
        self.registration(name, RegistrationOp::Add(queue)).await
    }

    /// Remove the mapping for `name`. Unknown names are not an error.
    pub async fn unregister_queue(&self, name: &str) -> BrokerResult<()> {
        self.registration(name, RegistrationOp::Remove).await
    }

    async fn registration(&self, name: &str, op: RegistrationOp<T>) -> BrokerResult<()> {
        let (reply, done) = oneshot::channel();
        self.registrations
            .send(Registration {
                name: name.to_string(),
                op,
                reply,
            })
            .await
            .map_err(|_| BrokerError::ManagerStopped)?;
        done.await.map_err(|_| BrokerError::ManagerStopped)
    }

    /// Send `data` to queue `queue` on node `node`.
    ///
    /// A send to this node's own name is handed to the manager loop directly
    /// and never touches the network. Delivery is fire-and-forget: an unknown
    /// or full target queue is not reported back.
    pub async fn send(&self, node: &str, queue: &str, data: Vec<u8>) -> BrokerResult<()> {
        if node == self.own_name {
            return self
                .deliveries
                .send(Delivery {
                    qname: queue.to_string(),
                    data,
                })
                .await
                .map_err(|_| BrokerError::ManagerStopped);
        }

        let conn = self.peers.connection_for(node)?;
        let frame = encode_message(&ProtocolMessage::Payload {
            qname: queue.to_string(),
            data,
        })?;
        conn.send(&frame).await?;
        Ok(())
    }

    /// Encode `value` with `encoder`, then [`send`](Self::send) the bytes.
    pub async fn send_value<V: ?Sized>(
        &self,
        node: &str,
        queue: &str,
        value: &V,
        encoder: &dyn PayloadEncoder<V>,
    ) -> BrokerResult<()> {
        let data = encoder.encode(value)?;
        self.send(node, queue, data).await
    }

    /// Tell every `Up` peer we are leaving and mark them `Closed`.
    ///
    /// Failures are logged per peer and do not stop the others.
    pub async fn close(&self) {
        let conns = self.peers.mark_closing();
        if conns.is_empty() {
            return;
        }

        let frame = match encode_message(&ProtocolMessage::Leave {
            name: self.own_name.clone(),
        }) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Encoding leave failed");
                return;
            }
        };

        for conn in conns {
            if let Err(e) = conn.send(&frame).await {
                warn!(addr = %conn.addr(), error = %e, "Leave send failed");
            }
        }
        info!(node = %self.own_name, "Broker closed");
    }

    /// Diagnostic copy of the peer store.
    pub fn peers(&self) -> Vec<PeerSnapshot> {
        self.peers.snapshot()
    }

    /// Best known state of the peer named `name`.
    pub fn peer_state(&self, name: &str) -> Option<PeerState> {
        self.peers.state_of(name)
    }
}

impl<T: Send + 'static> Drop for Broker<T> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.server.shutdown();
    }
}

/// Interprets transport frames as protocol messages.
struct Receiver {
    own_name: String,
    server: Arc<MessageServer>,
    peers: Arc<PeerStore>,
    deliveries: mpsc::Sender<Delivery>,
}

impl Receiver {
    async fn run(self) {
        loop {
            let msg = match self.server.receive().await {
                Ok(msg) => msg,
                Err(WireError::ServerClosed) => break,
                Err(e) => {
                    debug!(error = %e, "Receive error");
                    continue;
                }
            };

            match decode_message(&msg.data) {
                Ok(proto) => self.handle(&msg.from_addr, proto).await,
                Err(e) => {
                    debug!(from = %msg.from_addr, error = %e, "Dropping undecodable frame");
                }
            }
        }
    }

    async fn handle(&self, from: &str, msg: ProtocolMessage) {
        match msg {
            ProtocolMessage::Connect { name, id } => self.on_connect(from, name, id).await,
            ProtocolMessage::ConnectAck { name, id } => self.on_connect_ack(from, &name, id),
            ProtocolMessage::Leave { name } => self.on_leave(&name),
            ProtocolMessage::Payload { qname, data } => {
                if self.deliveries.send(Delivery { qname, data }).await.is_err() {
                    debug!(from = %from, "Manager stopped, dropping payload");
                }
            }
        }
    }

    async fn on_connect(&self, from: &str, name: String, id: u64) {
        let conn = match self.server.open_connection(from).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(peer = %name, addr = %from, error = %e, "No link back to connecting peer");
                return;
            }
        };
        let (slot, conn) = self.peers.upsert_inbound(&name, from, conn);
        info!(peer = %name, addr = %from, slot = %slot, "Peer connected");

        let ack = ProtocolMessage::ConnectAck {
            name: self.own_name.clone(),
            id,
        };
        let frame = match encode_message(&ack) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(peer = %name, error = %e, "Encoding connect-ack failed");
                return;
            }
        };
        if let Err(e) = conn.send(&frame).await {
            warn!(peer = %name, error = %e, "Connect-ack send failed");
        }
    }

    fn on_connect_ack(&self, from: &str, name: &str, id: u64) {
        let acked = PeerId::from_wire(id)
            .and_then(|slot| self.peers.acknowledge(slot, name, from));
        match acked {
            Some(_) => info!(peer = %name, addr = %from, slot = id, "Peer up"),
            None => warn!(
                peer = %name,
                addr = %from,
                slot = id,
                "Connect-ack does not match any dialed slot, dropping"
            ),
        }
    }

    fn on_leave(&self, name: &str) {
        let conns = self.peers.mark_leaving(name);
        if conns.is_empty() {
            debug!(peer = %name, "Leave from a peer with no open link");
            return;
        }
        info!(peer = %name, "Peer left");
        for conn in conns {
            conn.close();
        }
    }
}

/// Sole owner of the queue registry.
struct Manager<T> {
    own_name: String,
    queues: HashMap<String, Arc<BoundedQueue<T>>>,
    decoder: Arc<dyn PayloadDecoder<T>>,
}

impl<T: Send + 'static> Manager<T> {
    /// Serve registrations and deliveries, one at a time, in no fixed
    /// priority order.
    async fn run(
        mut self,
        mut registrations: mpsc::Receiver<Registration<T>>,
        mut deliveries: mpsc::Receiver<Delivery>,
    ) {
        loop {
            tokio::select! {
                Some(reg) = registrations.recv() => self.register(reg),
                Some(delivery) = deliveries.recv() => self.deliver(delivery),
                else => break,
            }
        }
        debug!(node = %self.own_name, "Manager loop stopped");
    }

    fn register(&mut self, reg: Registration<T>) {
        match reg.op {
            RegistrationOp::Add(queue) => {
                debug!(queue = %reg.name, capacity = queue.capacity(), "Queue registered");
                self.queues.insert(reg.name, queue);
            }
            RegistrationOp::Remove => {
                debug!(queue = %reg.name, "Queue unregistered");
                self.queues.remove(&reg.name);
            }
        }
        let _ = reg.reply.send(());
    }

    fn deliver(&self, delivery: Delivery) {
        if delivery.qname.is_empty() {
            debug!("Empty queue name, dropping payload");
            return;
        }
        let Some(queue) = self.queues.get(&delivery.qname) else {
            debug!(queue = %delivery.qname, "No such queue, dropping payload");
            return;
        };
        let item = match self.decoder.decode(delivery.data) {
            Ok(item) => item,
            Err(e) => {
                warn!(queue = %delivery.qname, error = %e, "Payload decode failed, dropping");
                return;
            }
        };
        if queue.put_no_wait(item).is_err() {
            debug!(queue = %delivery.qname, "Queue full, dropping payload");
        }
    }
}
