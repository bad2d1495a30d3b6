use libp2p::{Multiaddr, PeerId};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::ChannelClosed;
use crate::hash::Blake2bHash;
use crate::types::{Block, Transaction};

/// Commands accepted by the network actor.
#[derive(Debug, Clone)]
pub enum NetworkCommand {
    /// Gossip a block to all peers
    BroadcastBlock(Arc<Block>),

    /// Gossip a transaction to all peers
    BroadcastTransaction(Arc<Transaction>),

    /// Announce our chain status; `peer_id` is the peer that asked for it
    SendStatus {
        peer_id: PeerId,
        height: u64,
        best_hash: Blake2bHash,
    },

    /// Ask for blocks; `peer_id` is the peer expected to answer
    RequestBlocks {
        peer_id: PeerId,
        start_height: u64,
        count: u32,
    },

    /// Answer a block request
    SendBlocks { peer_id: PeerId, blocks: Vec<Block> },

    /// Ask peers for their chain status
    RequestStatus,

    Dial(Multiaddr),
}

/// Events emitted by the network actor. Every event names the peer the
/// underlying message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    BlockReceived {
        peer_id: PeerId,
        block: Block,
    },

    TransactionReceived {
        peer_id: PeerId,
        transaction: Transaction,
    },

    StatusReceived {
        peer_id: PeerId,
        height: u64,
        best_hash: Blake2bHash,
    },

    BlocksRequested {
        peer_id: PeerId,
        start_height: u64,
        count: u32,
    },
}

impl NetworkEvent {
    pub fn peer_id(&self) -> &PeerId {
        match self {
            NetworkEvent::BlockReceived { peer_id, .. }
            | NetworkEvent::TransactionReceived { peer_id, .. }
            | NetworkEvent::StatusReceived { peer_id, .. }
            | NetworkEvent::BlocksRequested { peer_id, .. } => peer_id,
        }
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<NetworkEvent>;

/// Cloneable handle for sending commands to the network actor.
///
/// Every method enqueues and returns immediately. Once the actor has stopped
/// they return [`ChannelClosed`] instead.
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    command_tx: mpsc::UnboundedSender<NetworkCommand>,
}

impl NetworkHandle {
    pub fn new(command_tx: mpsc::UnboundedSender<NetworkCommand>) -> Self {
        Self { command_tx }
    }

    pub fn send(&self, command: NetworkCommand) -> Result<(), ChannelClosed> {
        self.command_tx.send(command)?;
        Ok(())
    }

    pub fn broadcast_block(&self, block: Arc<Block>) -> Result<(), ChannelClosed> {
        self.send(NetworkCommand::BroadcastBlock(block))
    }

    pub fn broadcast_transaction(&self, tx: Arc<Transaction>) -> Result<(), ChannelClosed> {
        self.send(NetworkCommand::BroadcastTransaction(tx))
    }

    pub fn send_status(
        &self,
        peer_id: PeerId,
        height: u64,
        best_hash: Blake2bHash,
    ) -> Result<(), ChannelClosed> {
        self.send(NetworkCommand::SendStatus {
            peer_id,
            height,
            best_hash,
        })
    }

    pub fn request_blocks(
        &self,
        peer_id: PeerId,
        start_height: u64,
        count: u32,
    ) -> Result<(), ChannelClosed> {
        self.send(NetworkCommand::RequestBlocks {
            peer_id,
            start_height,
            count,
        })
    }

    pub fn send_blocks(&self, peer_id: PeerId, blocks: Vec<Block>) -> Result<(), ChannelClosed> {
        self.send(NetworkCommand::SendBlocks { peer_id, blocks })
    }

    pub fn request_status(&self) -> Result<(), ChannelClosed> {
        self.send(NetworkCommand::RequestStatus)
    }

    pub fn dial(&self, address: Multiaddr) -> Result<(), ChannelClosed> {
        self.send(NetworkCommand::Dial(address))
    }

    /// True once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }
}
