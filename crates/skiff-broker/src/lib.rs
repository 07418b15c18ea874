//! skiff broker: peer-to-peer delivery into named local queues.
//!
//! A [`Broker`] owns a transport server, a [`PeerStore`] and two background
//! tasks: a receive loop that interprets incoming envelopes as the
//! connect / connect-ack / leave / payload protocol, and a manager loop that
//! is the only owner of the queue registry and the only place payloads are
//! matched to a [`skiff_queue::BoundedQueue`].

pub mod broker;
pub mod codec;
pub mod config;
pub mod error;
pub mod registry;

pub use broker::Broker;
pub use codec::{JsonCodec, PayloadDecoder, PayloadEncoder, RawBytes};
pub use config::load_config;
pub use error::{BrokerError, BrokerResult, SendOutcome};
pub use registry::{PeerId, PeerSnapshot, PeerState, PeerStore};
