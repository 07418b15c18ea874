//! A registered TCP link.

use crate::error::{WireError, WireResult};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{watch, Mutex};

/// Frame terminator.
pub const FRAME_TERMINATOR: u8 = 0;

/// One TCP connection owned by a [`crate::MessageServer`].
///
/// The read half lives in the connection's receive loop; this handle owns
/// the write half. Concurrent senders are serialized by an async mutex so
/// frames never interleave on the socket.
pub struct Connection {
    id: u64,
    key: String,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    closed: watch::Sender<bool>,
}

impl Connection {
    pub(crate) fn new(
        id: u64,
        key: String,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        writer: OwnedWriteHalf,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            key,
            local_addr,
            remote_addr,
            writer: Mutex::new(writer),
            closed,
        }
    }

    /// Server-unique connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Registry key: the dialed address for outbound links, the observed
    /// peer address for inbound ones.
    pub fn addr(&self) -> &str {
        &self.key
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Write `payload` followed by the frame terminator.
    pub async fn send(&self, payload: &[u8]) -> WireResult<()> {
        if payload.contains(&FRAME_TERMINATOR) {
            return Err(WireError::NulInPayload);
        }
        if self.is_closed() {
            return Err(WireError::ConnectionClosed);
        }

        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.extend_from_slice(payload);
        frame.push(FRAME_TERMINATOR);

        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await.map_err(WireError::Send)?;
        writer.flush().await.map_err(WireError::Send)?;
        Ok(())
    }

    /// Close the connection.
    ///
    /// Signals the receive loop, which shuts the socket down and removes the
    /// registry entry on its way out.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub(crate) fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Shut the write half down unless a `send` holds it.
    ///
    /// A writer blocked on a peer that stopped reading must not keep the
    /// receive loop from deregistering the link.
    pub(crate) async fn shutdown_writer(&self) {
        if let Ok(mut writer) = self.writer.try_lock() {
            let _ = writer.shutdown().await;
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addr", &self.key)
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
