//! Overlay session beneath the actor.
//!
//! The actor only sees [`GossipTransport`]. [`Libp2pTransport`] is the real
//! implementation: TCP + Noise + Yamux, gossipsub on the two fixed topics,
//! identify, and optional mDNS discovery.

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{
    core::upgrade,
    gossipsub::{self, IdentTopic, MessageAuthenticity, ValidationMode},
    identify, identity, mdns, noise,
    swarm::{behaviour::toggle::Toggle, dial_opts::DialOpts, NetworkBehaviour, SwarmEvent},
    tcp, yamux, Multiaddr, PeerId, Swarm, Transport,
};
use log::{debug, info, warn};
use std::collections::VecDeque;

use super::protocol::PROTOCOL_ID;
use crate::config::NetworkConfig;
use crate::error::{InitError, NetworkError, PublishError};
use crate::hash::Blake2bHash;

/// The two gossip topics. Fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Blocks,
    Transactions,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::Blocks, Topic::Transactions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Blocks => "blocks",
            Topic::Transactions => "transactions",
        }
    }

    pub fn ident(&self) -> IdentTopic {
        IdentTopic::new(self.as_str())
    }

    pub fn from_name(name: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|topic| topic.as_str() == name)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport activity relevant to the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Gossip payload; `source` is the connected peer that relayed it.
    Gossip {
        source: PeerId,
        topic: String,
        data: Vec<u8>,
    },
    ConnectionEstablished {
        peer_id: PeerId,
        address: Multiaddr,
    },
    ConnectionClosed {
        peer_id: PeerId,
        remaining: u32,
    },
    NewListenAddr(Multiaddr),
    PeerDiscovered {
        peer_id: PeerId,
        address: Multiaddr,
    },
    PeerIdentified {
        peer_id: PeerId,
        agent_version: String,
        listen_addrs: Vec<Multiaddr>,
    },
    Subscribed {
        peer_id: PeerId,
        topic: String,
    },
    Unsubscribed {
        peer_id: PeerId,
        topic: String,
    },
}

#[async_trait]
pub trait GossipTransport: Send {
    fn local_peer_id(&self) -> PeerId;

    fn publish(&mut self, topic: Topic, data: Vec<u8>) -> Result<(), PublishError>;

    fn dial(&mut self, address: Multiaddr) -> Result<(), NetworkError>;

    /// Next transport event, or `None` once the transport is exhausted.
    ///
    /// Must be cancel-safe: the actor races it against the command channel.
    async fn next_event(&mut self) -> Option<TransportEvent>;
}

#[derive(NetworkBehaviour)]
pub struct GossipBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    pub identify: identify::Behaviour,
}

pub struct Libp2pTransport {
    swarm: Swarm<GossipBehaviour>,
    pending: VecDeque<TransportEvent>,
}

fn parse_addr(addr: &str) -> Result<Multiaddr, InitError> {
    addr.parse().map_err(|source| InitError::InvalidAddress {
        addr: addr.to_string(),
        source,
    })
}

fn load_keypair(config: &NetworkConfig) -> Result<identity::Keypair, InitError> {
    match &config.secret_key {
        Some(secret) => {
            let bytes = hex::decode(secret.trim())
                .map_err(|e| InitError::Identity(format!("secret key is not hex: {}", e)))?;
            identity::Keypair::ed25519_from_bytes(bytes)
                .map_err(|e| InitError::Identity(e.to_string()))
        }
        None => Ok(identity::Keypair::generate_ed25519()),
    }
}

impl Libp2pTransport {
    /// Builds the swarm, subscribes to both topics, starts listening and dials
    /// the bootstrap peers. Must run inside a tokio runtime.
    pub fn new(config: &NetworkConfig) -> Result<Self, InitError> {
        let listen_addr = parse_addr(&config.listen_addr)?;
        let bootstrap = config
            .bootstrap_peers
            .iter()
            .map(|addr| parse_addr(addr))
            .collect::<Result<Vec<_>, _>>()?;

        let local_key = load_keypair(config)?;
        let local_peer_id = PeerId::from(local_key.public());
        info!("🆔 Local PeerId: {}", local_peer_id);

        let transport = tcp::tokio::Transport::new(tcp::Config::default().nodelay(true))
            .upgrade(upgrade::Version::V1)
            .authenticate(
                noise::Config::new(&local_key).map_err(|e| InitError::Transport(e.to_string()))?,
            )
            .multiplex(yamux::Config::default())
            .boxed();

        let gossipsub_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(config.heartbeat_interval())
            .validation_mode(ValidationMode::Strict)
            .max_transmit_size(config.max_message_size)
            .message_id_fn(|message| {
                gossipsub::MessageId::from(Blake2bHash::hash(&message.data).to_string())
            })
            .build()
            .map_err(|e| InitError::Gossipsub(e.to_string()))?;

        let mut gossipsub = gossipsub::Behaviour::new(
            MessageAuthenticity::Signed(local_key.clone()),
            gossipsub_config,
        )
        .map_err(|e| InitError::Gossipsub(e.to_string()))?;

        for topic in Topic::ALL {
            gossipsub.subscribe(&topic.ident())?;
            debug!("📢 Subscribed to topic {}", topic);
        }

        let mdns = if config.enable_mdns {
            Some(
                mdns::tokio::Behaviour::new(mdns::Config::default(), local_peer_id)
                    .map_err(InitError::Mdns)?,
            )
        } else {
            None
        };

        let identify = identify::Behaviour::new(
            identify::Config::new(PROTOCOL_ID.to_string(), local_key.public())
                .with_agent_version(format!("chain-gossip/{}", env!("CARGO_PKG_VERSION"))),
        );

        let behaviour = GossipBehaviour {
            gossipsub,
            mdns: Toggle::from(mdns),
            identify,
        };

        let swarm_config = libp2p::swarm::Config::with_tokio_executor()
            .with_idle_connection_timeout(config.idle_connection_timeout());
        let mut swarm = Swarm::new(transport, behaviour, local_peer_id, swarm_config);

        swarm.listen_on(listen_addr.clone())?;
        info!("👂 Listening on {}", listen_addr);

        for addr in bootstrap {
            if let Err(e) = swarm.dial(addr.clone()) {
                warn!("Failed to dial bootstrap peer {}: {}", addr, e);
            }
        }

        Ok(Self {
            swarm,
            pending: VecDeque::new(),
        })
    }

    fn translate(&mut self, event: SwarmEvent<GossipBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                self.pending.push_back(TransportEvent::NewListenAddr(address));
            }
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                self.pending.push_back(TransportEvent::ConnectionEstablished {
                    peer_id,
                    address: endpoint.get_remote_address().clone(),
                });
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                self.pending.push_back(TransportEvent::ConnectionClosed {
                    peer_id,
                    remaining: num_established,
                });
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                debug!("Outgoing connection to {:?} failed: {}", peer_id, error);
            }
            SwarmEvent::Behaviour(GossipBehaviourEvent::Gossipsub(event)) => match event {
                gossipsub::Event::Message {
                    propagation_source,
                    message,
                    ..
                } => {
                    self.pending.push_back(TransportEvent::Gossip {
                        source: propagation_source,
                        topic: message.topic.into_string(),
                        data: message.data,
                    });
                }
                gossipsub::Event::Subscribed { peer_id, topic } => {
                    self.pending.push_back(TransportEvent::Subscribed {
                        peer_id,
                        topic: topic.into_string(),
                    });
                }
                gossipsub::Event::Unsubscribed { peer_id, topic } => {
                    self.pending.push_back(TransportEvent::Unsubscribed {
                        peer_id,
                        topic: topic.into_string(),
                    });
                }
                gossipsub::Event::GossipsubNotSupported { peer_id } => {
                    warn!("⚠️  Peer {} does not support gossipsub", peer_id);
                }
            },
            SwarmEvent::Behaviour(GossipBehaviourEvent::Mdns(event)) => match event {
                mdns::Event::Discovered(list) => {
                    for (peer_id, address) in list {
                        let opts = DialOpts::peer_id(peer_id)
                            .addresses(vec![address.clone()])
                            .build();
                        if let Err(e) = self.swarm.dial(opts) {
                            debug!("Not dialing discovered peer {}: {}", peer_id, e);
                        }
                        self.pending
                            .push_back(TransportEvent::PeerDiscovered { peer_id, address });
                    }
                }
                mdns::Event::Expired(list) => {
                    for (peer_id, _) in list {
                        debug!("⏰ Peer {} expired from mDNS", peer_id);
                    }
                }
            },
            SwarmEvent::Behaviour(GossipBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                self.pending.push_back(TransportEvent::PeerIdentified {
                    peer_id,
                    agent_version: info.agent_version,
                    listen_addrs: info.listen_addrs,
                });
            }
            _ => {}
        }
    }
}

#[async_trait]
impl GossipTransport for Libp2pTransport {
    fn local_peer_id(&self) -> PeerId {
        *self.swarm.local_peer_id()
    }

    fn publish(&mut self, topic: Topic, data: Vec<u8>) -> Result<(), PublishError> {
        self.swarm
            .behaviour_mut()
            .gossipsub
            .publish(topic.ident(), data)
            .map(|_| ())
            .map_err(PublishError::from)
    }

    fn dial(&mut self, address: Multiaddr) -> Result<(), NetworkError> {
        self.swarm
            .dial(address.clone())
            .map_err(|e| NetworkError::Dial {
                address,
                reason: e.to_string(),
            })
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            // Swarm::next is cancel-safe and translate does not await, so a
            // dropped future never loses an event.
            let event = self.swarm.next().await?;
            self.translate(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> NetworkConfig {
        NetworkConfig {
            listen_addr: "/ip4/127.0.0.1/tcp/0".to_string(),
            enable_mdns: false,
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn topic_names_are_fixed() {
        assert_eq!(Topic::Blocks.as_str(), "blocks");
        assert_eq!(Topic::Transactions.as_str(), "transactions");
        assert_eq!(Topic::from_name("blocks"), Some(Topic::Blocks));
        assert_eq!(Topic::from_name("votes"), None);
        assert_eq!(Topic::Blocks.ident().hash().as_str(), "blocks");
    }

    #[tokio::test]
    async fn transport_creation_succeeds() {
        assert!(Libp2pTransport::new(&test_config()).is_ok());
    }

    #[tokio::test]
    async fn invalid_listen_address_is_rejected() {
        let config = NetworkConfig {
            listen_addr: "not-a-multiaddr".to_string(),
            ..test_config()
        };
        match Libp2pTransport::new(&config) {
            Err(InitError::InvalidAddress { addr, .. }) => assert_eq!(addr, "not-a-multiaddr"),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn invalid_bootstrap_address_is_rejected() {
        let config = NetworkConfig {
            bootstrap_peers: vec!["/ip4/127.0.0.1/tcp/1".to_string(), "garbage".to_string()],
            ..test_config()
        };
        assert!(matches!(
            Libp2pTransport::new(&config),
            Err(InitError::InvalidAddress { .. })
        ));
    }

    #[tokio::test]
    async fn secret_key_gives_stable_peer_id() {
        let config = NetworkConfig {
            secret_key: Some("11".repeat(32)),
            ..test_config()
        };
        let a = Libp2pTransport::new(&config).unwrap();
        let b = Libp2pTransport::new(&config).unwrap();
        assert_eq!(a.local_peer_id(), b.local_peer_id());

        let random = Libp2pTransport::new(&test_config()).unwrap();
        assert_ne!(a.local_peer_id(), random.local_peer_id());
    }

    #[tokio::test]
    async fn bad_secret_key_is_an_identity_error() {
        for secret in ["zz", "abcd"] {
            let config = NetworkConfig {
                secret_key: Some(secret.to_string()),
                ..test_config()
            };
            assert!(matches!(
                Libp2pTransport::new(&config),
                Err(InitError::Identity(_))
            ));
        }
    }

    #[tokio::test]
    async fn reports_listen_address() {
        let mut transport = Libp2pTransport::new(&test_config()).unwrap();
        let event = tokio::time::timeout(std::time::Duration::from_secs(5), transport.next_event())
            .await
            .unwrap();
        assert!(matches!(event, Some(TransportEvent::NewListenAddr(_))));
    }

    #[tokio::test]
    async fn publish_without_peers_is_insufficient_peers() {
        let mut transport = Libp2pTransport::new(&test_config()).unwrap();
        assert_eq!(
            transport.publish(Topic::Blocks, b"hello".to_vec()),
            Err(PublishError::InsufficientPeers)
        );
    }
}
