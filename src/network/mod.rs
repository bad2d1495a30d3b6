//! Gossip networking: wire protocol, command/event vocabulary, handle and the
//! actor that drives the libp2p swarm.

pub mod actor;
pub mod peer;
pub mod protocol;
pub mod service;
pub mod transport;

pub use actor::{events_for, NetworkActor};
pub use peer::{PeerInfo, PeerTable};
pub use protocol::{Codec, Message, MessageType, PROTOCOL_ID, PROTOCOL_VERSION};
pub use service::{EventReceiver, NetworkCommand, NetworkEvent, NetworkHandle};
pub use transport::{GossipTransport, Libp2pTransport, Topic, TransportEvent};
