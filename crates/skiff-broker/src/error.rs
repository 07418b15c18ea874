//! Broker error types.

use crate::registry::PeerState;
use skiff_types::ConfigError;
use skiff_wire::WireError;
use thiserror::Error;

/// Errors surfaced by broker operations.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Construction options were missing or malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Bind, dial, send or codec failure in the wire layer.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// No peer with this name is known.
    #[error("Peer ({0}) not found")]
    PeerNotFound(String),

    /// The peer is known but cannot carry traffic.
    #[error("Peer ({name}) is not up (state: {state})")]
    PeerNotUp { name: String, state: PeerState },

    /// The caller-supplied encode transform failed.
    #[error("Encode failed: {0}")]
    Encode(String),

    /// The decode transform failed.
    #[error("Decode failed: {0}")]
    Decode(String),

    /// The manager loop is no longer running.
    #[error("Broker manager stopped")]
    ManagerStopped,
}

/// Alias for broker results.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Flat success flag plus error text, for callers that cannot carry a
/// typed error across their boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub ok: bool,
    pub error: String,
}

impl<T> From<&BrokerResult<T>> for SendOutcome {
    fn from(result: &BrokerResult<T>) -> Self {
        match result {
            Ok(_) => Self {
                ok: true,
                error: String::new(),
            },
            Err(e) => Self {
                ok: false,
                error: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_outcome() {
        let ok: BrokerResult<()> = Ok(());
        assert_eq!(
            SendOutcome::from(&ok),
            SendOutcome {
                ok: true,
                error: String::new()
            }
        );

        let err: BrokerResult<()> = Err(BrokerError::PeerNotUp {
            name: "beta".into(),
            state: PeerState::Closed,
        });
        let outcome = SendOutcome::from(&err);
        assert!(!outcome.ok);
        assert_eq!(outcome.error, "Peer (beta) is not up (state: closed)");
    }
}
