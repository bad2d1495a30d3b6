use libp2p::PeerId;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use super::peer::PeerTable;
use super::protocol::{Codec, Message, PROTOCOL_VERSION};
use super::service::{EventReceiver, NetworkCommand, NetworkEvent, NetworkHandle};
use super::transport::{GossipTransport, Libp2pTransport, Topic, TransportEvent};
use crate::config::NetworkConfig;
use crate::error::{InitError, NetworkError, PublishError};

/// Owns the overlay session and the peer table and runs the control loop.
///
/// All interaction goes through the [`NetworkHandle`] (commands in) and the
/// [`EventReceiver`] (events out). The loop stops once every handle is dropped.
pub struct NetworkActor<T = Libp2pTransport> {
    transport: T,
    codec: Codec,
    peers: PeerTable,
    command_rx: mpsc::UnboundedReceiver<NetworkCommand>,
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    subscriber_gone: bool,
}

impl NetworkActor<Libp2pTransport> {
    /// Builds the libp2p session from `config`. Must be called inside a tokio
    /// runtime.
    pub fn new(config: NetworkConfig) -> Result<(Self, NetworkHandle, EventReceiver), InitError> {
        info!("🌍 Initializing P2P network");
        let transport = Libp2pTransport::new(&config)?;
        Ok(Self::with_transport(
            transport,
            Codec::new(config.max_message_size),
        ))
    }
}

impl<T: GossipTransport> NetworkActor<T> {
    pub fn with_transport(transport: T, codec: Codec) -> (Self, NetworkHandle, EventReceiver) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let actor = Self {
            transport,
            codec,
            peers: PeerTable::new(),
            command_rx,
            event_tx,
            subscriber_gone: false,
        };
        (actor, NetworkHandle::new(command_tx), event_rx)
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.transport.local_peer_id()
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// Runs until every [`NetworkHandle`] is dropped (`Ok`) or the transport is
    /// exhausted (`Err`).
    pub async fn run(mut self) -> Result<(), NetworkError> {
        info!("▶️  Starting P2P network loop for {}", self.local_peer_id());

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("⏹️  All network handles dropped, stopping network loop");
                        return Ok(());
                    }
                },
                event = self.transport.next_event() => match event {
                    Some(event) => self.handle_transport_event(event),
                    None => {
                        warn!("Overlay transport closed, stopping network loop");
                        return Err(NetworkError::TransportClosed);
                    }
                },
            }
        }
    }

    fn handle_command(&mut self, command: NetworkCommand) {
        match command {
            NetworkCommand::BroadcastBlock(block) => {
                let height = block.height();
                let message = Message::NewBlock {
                    block: (*block).clone(),
                };
                if self.publish(Topic::Blocks, &message).is_ok() {
                    info!(
                        "📢 Broadcasted block #{} to {} peer(s)",
                        height,
                        self.peers.subscriber_count(Topic::Blocks.as_str())
                    );
                }
            }
            NetworkCommand::BroadcastTransaction(tx) => {
                let message = Message::NewTransaction {
                    transaction: (*tx).clone(),
                };
                if self.publish(Topic::Transactions, &message).is_ok() {
                    info!(
                        "📢 Broadcasted transaction {} to {} peer(s)",
                        tx.hash().short(),
                        self.peers.subscriber_count(Topic::Transactions.as_str())
                    );
                }
            }
            NetworkCommand::SendStatus {
                peer_id,
                height,
                best_hash,
            } => {
                let message = Message::Status {
                    height,
                    best_block_hash: best_hash,
                    protocol_version: PROTOCOL_VERSION,
                };
                if self.publish(Topic::Blocks, &message).is_ok() {
                    debug!("📤 Sent status (height {}) for {}", height, peer_id);
                }
            }
            NetworkCommand::RequestBlocks {
                peer_id,
                start_height,
                count,
            } => {
                let message = Message::GetBlocks {
                    start_height,
                    count,
                };
                if self.publish(Topic::Blocks, &message).is_ok() {
                    debug!(
                        "📨 Requested {} block(s) from height {} (asked {})",
                        count, start_height, peer_id
                    );
                }
            }
            NetworkCommand::SendBlocks { peer_id, blocks } => {
                let count = blocks.len();
                let message = Message::Blocks { blocks };
                if self.publish(Topic::Blocks, &message).is_ok() {
                    debug!("📤 Sent {} block(s) for {}", count, peer_id);
                }
            }
            NetworkCommand::RequestStatus => {
                if self.publish(Topic::Blocks, &Message::GetStatus).is_ok() {
                    debug!("📨 Requested network status");
                }
            }
            NetworkCommand::Dial(address) => {
                if let Err(e) = self.transport.dial(address) {
                    warn!("{}", e);
                }
            }
        }
    }

    /// Publishes once. Failures are logged here and never retried.
    fn publish(&mut self, topic: Topic, message: &Message) -> Result<(), PublishError> {
        let data = self.codec.encode(message);
        let result = self.transport.publish(topic, data);
        match &result {
            Ok(()) => {}
            Err(PublishError::InsufficientPeers) => {
                debug!(
                    "No peers on topic {} yet, dropped {}",
                    topic,
                    message.message_type()
                );
            }
            Err(e) => {
                warn!(
                    "Failed to publish {} on {}: {}",
                    message.message_type(),
                    topic,
                    e
                );
            }
        }
        result
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Gossip {
                source,
                topic,
                data,
            } => self.handle_gossip(source, &topic, &data),
            TransportEvent::ConnectionEstablished { peer_id, address } => {
                info!("🤝 Connected to peer {} at {}", peer_id, address);
                self.peers.connection_established(peer_id, address);
            }
            TransportEvent::ConnectionClosed { peer_id, remaining } => {
                if remaining == 0 {
                    info!("👋 Disconnected from peer {}", peer_id);
                }
                self.peers.connection_closed(&peer_id, remaining);
            }
            TransportEvent::NewListenAddr(address) => {
                info!("📡 Listening on {}", address);
            }
            TransportEvent::PeerDiscovered { peer_id, address } => {
                info!("🔍 Discovered peer {} at {}", peer_id, address);
                self.peers.discovered(peer_id, address);
            }
            TransportEvent::PeerIdentified {
                peer_id,
                agent_version,
                listen_addrs,
            } => {
                debug!("🆔 Identified peer {} ({})", peer_id, agent_version);
                self.peers.identified(peer_id, agent_version, listen_addrs);
            }
            TransportEvent::Subscribed { peer_id, topic } => {
                debug!("✅ Peer {} subscribed to {}", peer_id, topic);
                self.peers.subscribed(peer_id, topic);
            }
            TransportEvent::Unsubscribed { peer_id, topic } => {
                debug!("Peer {} unsubscribed from {}", peer_id, topic);
                self.peers.unsubscribed(&peer_id, &topic);
            }
        }
    }

    fn handle_gossip(&mut self, source: PeerId, topic: &str, data: &[u8]) {
        let message = match self.codec.decode(data) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping undecodable message from {} on {}: {}", source, topic, e);
                return;
            }
        };
        debug!("📩 Received {} from {}", message.message_type(), source);

        // `source` is the relaying connection; only peers the table already
        // tracks are updated.
        let known = match &message {
            Message::Status {
                height,
                best_block_hash,
                ..
            } => self.peers.update_status(&source, *height, *best_block_hash),
            _ => self.peers.touch(&source),
        };
        if !known {
            debug!("Gossip relayed by untracked peer {}", source);
        }

        for event in events_for(source, message) {
            self.emit(event);
        }
    }

    fn emit(&mut self, event: NetworkEvent) {
        if self.event_tx.send(event).is_err() && !self.subscriber_gone {
            self.subscriber_gone = true;
            debug!("Event receiver dropped, inbound events are discarded from now on");
        }
    }
}

/// Maps one decoded wire message from `peer_id` to the events it produces.
///
/// `Blocks` yields one `BlockReceived` per block in wire order. `GetStatus`,
/// `Ping` and `Pong` produce no event and are only logged.
pub fn events_for(peer_id: PeerId, message: Message) -> Vec<NetworkEvent> {
    match message {
        Message::NewBlock { block } => vec![NetworkEvent::BlockReceived { peer_id, block }],
        Message::NewTransaction { transaction } => {
            vec![NetworkEvent::TransactionReceived {
                peer_id,
                transaction,
            }]
        }
        Message::Status {
            height,
            best_block_hash,
            ..
        } => vec![NetworkEvent::StatusReceived {
            peer_id,
            height,
            best_hash: best_block_hash,
        }],
        Message::GetBlocks {
            start_height,
            count,
        } => vec![NetworkEvent::BlocksRequested {
            peer_id,
            start_height,
            count,
        }],
        Message::Blocks { blocks } => blocks
            .into_iter()
            .map(|block| NetworkEvent::BlockReceived { peer_id, block })
            .collect(),
        Message::GetStatus => {
            info!("Received GetStatus from {}", peer_id);
            Vec::new()
        }
        Message::Ping { nonce } => {
            info!("Received ping from {} (nonce {})", peer_id, nonce);
            Vec::new()
        }
        Message::Pong { nonce } => {
            info!("Received pong from {} (nonce {})", peer_id, nonce);
            Vec::new()
        }
    }
}
