use chrono::{DateTime, Utc};
use libp2p::{Multiaddr, PeerId};
use std::collections::{HashMap, HashSet};

use crate::hash::Blake2bHash;

#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub peer_id: PeerId,
    pub addresses: Vec<Multiaddr>,
    pub connected: bool,
    /// Open connections to this peer
    pub connections: u32,
    pub connected_since: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
    pub agent_version: Option<String>,
    /// Gossip topics the peer announced
    pub topics: HashSet<String>,
    /// Last chain status the peer reported
    pub height: Option<u64>,
    pub best_block_hash: Option<Blake2bHash>,
}

impl PeerInfo {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            addresses: Vec::new(),
            connected: false,
            connections: 0,
            connected_since: None,
            last_seen: Utc::now(),
            agent_version: None,
            topics: HashSet::new(),
            height: None,
            best_block_hash: None,
        }
    }

    fn add_address(&mut self, address: Multiaddr) {
        if !self.addresses.contains(&address) {
            self.addresses.push(address);
        }
    }
}

/// Local view of known peers. Owned by the actor and rebuilt from transport
/// events, never persisted.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<PeerId, PeerInfo>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, peer_id: PeerId) -> &mut PeerInfo {
        self.peers
            .entry(peer_id)
            .or_insert_with(|| PeerInfo::new(peer_id))
    }

    pub fn connection_established(&mut self, peer_id: PeerId, address: Multiaddr) {
        let now = Utc::now();
        let peer = self.entry(peer_id);
        peer.add_address(address);
        peer.connections += 1;
        if !peer.connected {
            peer.connected = true;
            peer.connected_since = Some(now);
        }
        peer.last_seen = now;
    }

    /// `remaining` is the number of connections still open to the peer.
    pub fn connection_closed(&mut self, peer_id: &PeerId, remaining: u32) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.connections = remaining;
            if remaining == 0 {
                peer.connected = false;
                peer.connected_since = None;
            }
        }
    }

    pub fn discovered(&mut self, peer_id: PeerId, address: Multiaddr) {
        self.entry(peer_id).add_address(address);
    }

    pub fn identified(&mut self, peer_id: PeerId, agent_version: String, addresses: Vec<Multiaddr>) {
        let peer = self.entry(peer_id);
        peer.agent_version = Some(agent_version);
        for address in addresses {
            peer.add_address(address);
        }
        peer.last_seen = Utc::now();
    }

    pub fn subscribed(&mut self, peer_id: PeerId, topic: String) {
        self.entry(peer_id).topics.insert(topic);
    }

    pub fn unsubscribed(&mut self, peer_id: &PeerId, topic: &str) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.topics.remove(topic);
        }
    }

    /// Refreshes `last_seen` for a known peer. Returns `false` for peers the
    /// table has never heard of; gossip alone never adds an entry.
    pub fn touch(&mut self, peer_id: &PeerId) -> bool {
        match self.peers.get_mut(peer_id) {
            Some(peer) => {
                peer.last_seen = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Records a reported chain status for a known peer. Unknown peers are
    /// ignored and `false` is returned.
    pub fn update_status(
        &mut self,
        peer_id: &PeerId,
        height: u64,
        best_block_hash: Blake2bHash,
    ) -> bool {
        match self.peers.get_mut(peer_id) {
            Some(peer) => {
                peer.height = Some(height);
                peer.best_block_hash = Some(best_block_hash);
                peer.last_seen = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerInfo> {
        self.peers.get(peer_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerInfo> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.peers.values().filter(|p| p.connected).count()
    }

    /// Connected peers that announced `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.peers
            .values()
            .filter(|p| p.connected && p.topics.contains(topic))
            .count()
    }
}
