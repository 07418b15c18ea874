//! MessageServer: TCP listener and connection registry.
//!
//! A [`MessageServer`] binds a local listener and keeps every live
//! connection, inbound or dialed, in a registry keyed by address. Each
//! connection runs its own receive loop that splits the byte stream on the
//! zero terminator and pushes frames into a single bounded inbox. A full
//! inbox drops frames instead of pushing back on the sender.

use crate::connection::{Connection, FRAME_TERMINATOR};
use crate::error::{WireError, WireResult};

use dashmap::DashMap;
use skiff_types::TransportConfig;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A frame received on one of the server's connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Registry key of the connection the frame arrived on.
    pub from_addr: String,
    /// Frame contents without the terminator.
    pub data: Vec<u8>,
}

/// State shared between the server handle, the acceptor and receive loops.
struct Shared {
    config: TransportConfig,
    conns: DashMap<String, Arc<Connection>>,
    inbox: mpsc::Sender<Message>,
    next_id: AtomicU64,
}

impl Shared {
    /// Register a fresh stream under `key` and start its receive loop.
    ///
    /// If another connection claimed `key` first, the existing entry wins and
    /// the new stream is dropped.
    fn register(self: &Arc<Self>, stream: TcpStream, key: String) -> WireResult<Arc<Connection>> {
        let local_addr = stream.local_addr()?;
        let remote_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(Connection::new(id, key.clone(), local_addr, remote_addr, writer));

        let entry = self.conns.entry(key).or_insert_with(|| Arc::clone(&conn));
        let registered = Arc::clone(entry.value());
        drop(entry);

        if registered.id() != id {
            debug!(addr = %registered.addr(), "Connection already registered, reusing");
            return Ok(registered);
        }

        let shared = Arc::clone(self);
        let loop_conn = Arc::clone(&conn);
        tokio::spawn(async move {
            receive_loop(shared, loop_conn, reader).await;
        });
        Ok(conn)
    }

    /// Remove `key` only if it still maps to connection `id`.
    fn deregister(&self, key: &str, id: u64) {
        self.conns.remove_if(key, |_, c| c.id() == id);
    }
}

/// TCP message server.
pub struct MessageServer {
    shared: Arc<Shared>,
    inbox: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl MessageServer {
    /// Bind `addr` and start accepting connections.
    pub async fn bind(addr: &str, config: TransportConfig) -> WireResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| WireError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let (tx, rx) = mpsc::channel(config.inbox_capacity.max(1));
        let shared = Arc::new(Shared {
            config,
            conns: DashMap::new(),
            inbox: tx,
            next_id: AtomicU64::new(0),
        });

        info!(addr = %local_addr, "Message server listening");

        let accept_shared = Arc::clone(&shared);
        let accept_task = tokio::spawn(async move {
            accept_loop(listener, accept_shared).await;
        });

        Ok(Self {
            shared,
            inbox: tokio::sync::Mutex::new(rx),
            local_addr,
            accept_task,
        })
    }

    /// Actual bound address (useful when binding to port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Return the registered connection for `addr`, dialing one if needed.
    pub async fn open_connection(&self, addr: &str) -> WireResult<Arc<Connection>> {
        if let Some(conn) = self.connection(addr) {
            return Ok(conn);
        }

        debug!(addr = %addr, "Dialing");
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| WireError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        self.shared.register(stream, addr.to_string())
    }

    /// Look up a registered connection without dialing.
    pub fn connection(&self, addr: &str) -> Option<Arc<Connection>> {
        self.shared.conns.get(addr).map(|c| Arc::clone(c.value()))
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.shared.conns.len()
    }

    /// Wait for the next frame from any connection.
    pub async fn receive(&self) -> WireResult<Message> {
        self.inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or(WireError::ServerClosed)
    }

    /// Stop accepting and close every registered connection.
    pub fn shutdown(&self) {
        self.accept_task.abort();
        for entry in self.shared.conns.iter() {
            entry.value().close();
        }
    }
}

impl Drop for MessageServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!(addr = %addr, "Accepted connection");
                if let Err(e) = shared.register(stream, addr.to_string()) {
                    warn!(addr = %addr, error = %e, "Failed to register inbound connection");
                }
            }
            Err(e) => {
                error!(error = %e, "Accept error");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// Per-connection read loop.
///
/// Every terminal condition deregisters the connection: end of stream,
/// local close, an oversize frame, and any other read error alike.
async fn receive_loop(shared: Arc<Shared>, conn: Arc<Connection>, reader: OwnedReadHalf) {
    let key = conn.addr().to_string();
    let max = shared.config.max_frame_size;
    let mut reader = BufReader::new(reader);
    let mut closed = conn.closed_signal();
    let mut buf = Vec::new();

    let reason = loop {
        buf.clear();
        let read = tokio::select! {
            r = read_frame(&mut reader, &mut buf, max) => r,
            _ = closed.wait_for(|c| *c) => Err(WireError::ConnectionClosed),
        };
        if let Err(e) = read {
            break e;
        }

        let msg = Message {
            from_addr: key.clone(),
            data: std::mem::take(&mut buf),
        };
        match shared.inbox.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(addr = %key, "Inbox full, dropping frame");
            }
            Err(TrySendError::Closed(_)) => break WireError::ServerClosed,
        }
    };

    match &reason {
        WireError::ConnectionClosed | WireError::ServerClosed => {
            debug!(addr = %key, "Connection closed");
        }
        other => {
            warn!(addr = %key, error = %other, "Connection read failed");
        }
    }

    conn.close();
    conn.shutdown_writer().await;
    shared.deregister(&key, conn.id());
}

/// Read one frame into `buf`, terminator stripped.
///
/// A clean or mid-frame end of stream is reported as `ConnectionClosed`;
/// any partial frame is discarded.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> WireResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let limit = max as u64 + 1;
    let mut limited = (&mut *reader).take(limit);
    let n = limited.read_until(FRAME_TERMINATOR, buf).await?;
    if n == 0 {
        return Err(WireError::ConnectionClosed);
    }
    if buf.last() != Some(&FRAME_TERMINATOR) {
        if n as u64 >= limit {
            return Err(WireError::FrameTooLarge { size: n, max });
        }
        return Err(WireError::ConnectionClosed);
    }
    buf.pop();
    Ok(())
}
