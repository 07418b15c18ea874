//! skiff wire layer: TCP transport and envelope codec.
//!
//! Moves discrete messages between nodes over plain TCP. Every frame is an
//! encoded envelope followed by a single zero byte.
//!
//! ## Architecture
//!
//! - **MessageServer**: listener, per-connection receive loops and the
//!   address-keyed connection registry. All inbound frames funnel into one
//!   bounded inbox read through [`MessageServer::receive`].
//! - **Connection**: one registered TCP link; writes are serialized per link.
//! - **Envelope**: the JSON record carried in each frame, with a typed
//!   [`ProtocolMessage`] view for the broker handshake and payloads.

pub mod connection;
pub mod error;
pub mod message;
pub mod server;

pub use connection::Connection;
pub use error::{WireError, WireResult};
pub use message::{decode_message, encode_message, Envelope, ProtocolMessage};
pub use server::{Message, MessageServer};
