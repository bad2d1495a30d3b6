use libp2p::{gossipsub, Multiaddr};
use tokio::sync::mpsc;

use crate::network::NetworkCommand;

/// Failure to bring up the network actor. Never retried internally.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("invalid multiaddr {addr:?}: {source}")]
    InvalidAddress {
        addr: String,
        source: libp2p::multiaddr::Error,
    },

    #[error("identity error: {0}")]
    Identity(String),

    #[error("transport setup failed: {0}")]
    Transport(String),

    #[error("gossipsub setup failed: {0}")]
    Gossipsub(String),

    #[error("topic subscription failed: {0}")]
    Subscription(#[from] gossipsub::SubscriptionError),

    #[error("mDNS setup failed: {0}")]
    Mdns(#[source] std::io::Error),

    #[error("failed to listen: {0}")]
    Listen(#[from] libp2p::TransportError<std::io::Error>),
}

/// A gossip payload that is not a valid wire message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload of {size} bytes exceeds limit of {max}")]
    Oversized { size: usize, max: usize },

    #[error("truncated payload: {0}")]
    Truncated(#[source] serde_json::Error),

    #[error("malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_eof() {
            DecodeError::Truncated(e)
        } else {
            DecodeError::Malformed(e)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("no peers subscribed to the topic")]
    InsufficientPeers,

    #[error("message was already published")]
    Duplicate,

    #[error("message exceeds the transmit size limit")]
    MessageTooLarge,

    #[error("publish rejected: {0}")]
    Rejected(String),
}

impl From<gossipsub::PublishError> for PublishError {
    fn from(e: gossipsub::PublishError) -> Self {
        match e {
            gossipsub::PublishError::InsufficientPeers => PublishError::InsufficientPeers,
            gossipsub::PublishError::Duplicate => PublishError::Duplicate,
            gossipsub::PublishError::MessageTooLarge => PublishError::MessageTooLarge,
            other => PublishError::Rejected(other.to_string()),
        }
    }
}

/// Returned by [`crate::network::NetworkHandle`] once the actor has stopped.
/// Carries the command that could not be delivered.
#[derive(Debug, thiserror::Error)]
#[error("network actor has stopped, command dropped")]
pub struct ChannelClosed(pub NetworkCommand);

impl From<mpsc::error::SendError<NetworkCommand>> for ChannelClosed {
    fn from(e: mpsc::error::SendError<NetworkCommand>) -> Self {
        ChannelClosed(e.0)
    }
}

/// Errors raised while the actor loop is running.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The overlay stopped producing events; the loop cannot continue.
    #[error("overlay transport stream ended")]
    TransportClosed,

    #[error("failed to dial {address}: {reason}")]
    Dial { address: Multiaddr, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Message;

    #[test]
    fn eof_is_reported_as_truncated() {
        let err = Message::from_bytes(br#"{"Ping":{"nonce":"#).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated(_)));

        let err = Message::from_bytes(b"").unwrap_err();
        assert!(matches!(err, DecodeError::Truncated(_)));
    }

    #[test]
    fn garbage_is_reported_as_malformed() {
        let err = Message::from_bytes(b"\x00\xff\x10").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));

        let err = Message::from_bytes(br#"{"Teleport":{}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn gossipsub_publish_errors_map_to_local_variants() {
        assert_eq!(
            PublishError::from(gossipsub::PublishError::InsufficientPeers),
            PublishError::InsufficientPeers
        );
        assert_eq!(
            PublishError::from(gossipsub::PublishError::Duplicate),
            PublishError::Duplicate
        );
        assert_eq!(
            PublishError::from(gossipsub::PublishError::MessageTooLarge),
            PublishError::MessageTooLarge
        );
    }

    #[test]
    fn channel_closed_returns_the_command() {
        let (tx, rx) = mpsc::unbounded_channel::<NetworkCommand>();
        drop(rx);
        let err: ChannelClosed = tx.send(NetworkCommand::RequestStatus).unwrap_err().into();
        assert!(matches!(err.0, NetworkCommand::RequestStatus));
    }
}
