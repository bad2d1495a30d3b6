//! Wire messages exchanged between peers over gossipsub.
//!
//! Messages are encoded as JSON. All message structs have a fixed field order
//! and no maps, so encoding is deterministic: the same value always yields the
//! same bytes.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_MAX_MESSAGE_SIZE;
use crate::error::DecodeError;
use crate::hash::Blake2bHash;
use crate::types::{Block, Transaction};

pub const PROTOCOL_VERSION: u32 = 1;

/// Advertised through identify.
pub const PROTOCOL_ID: &str = "/chain-gossip/1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub enum Message {
    /// Announce a new block
    NewBlock { block: Block },

    /// Announce a new transaction
    NewTransaction { transaction: Transaction },

    /// Chain status of the sender
    Status {
        height: u64,
        best_block_hash: Blake2bHash,
        protocol_version: u32,
    },

    /// Ask for `count` blocks starting at `start_height`
    GetBlocks { start_height: u64, count: u32 },

    /// Blocks in ascending height order
    Blocks { blocks: Vec<Block> },

    GetStatus,

    Ping { nonce: u64 },

    Pong { nonce: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    NewBlock,
    NewTransaction,
    Status,
    GetBlocks,
    Blocks,
    GetStatus,
    Ping,
    Pong,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::NewBlock => "NewBlock",
            MessageType::NewTransaction => "NewTransaction",
            MessageType::Status => "Status",
            MessageType::GetBlocks => "GetBlocks",
            MessageType::Blocks => "Blocks",
            MessageType::GetStatus => "GetStatus",
            MessageType::Ping => "Ping",
            MessageType::Pong => "Pong",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::NewBlock { .. } => MessageType::NewBlock,
            Message::NewTransaction { .. } => MessageType::NewTransaction,
            Message::Status { .. } => MessageType::Status,
            Message::GetBlocks { .. } => MessageType::GetBlocks,
            Message::Blocks { .. } => MessageType::Blocks,
            Message::GetStatus => MessageType::GetStatus,
            Message::Ping { .. } => MessageType::Ping,
            Message::Pong { .. } => MessageType::Pong,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Only derived impls with string keys are involved, which serde_json
        // cannot fail on.
        serde_json::to_vec(self).expect("wire messages are always JSON-encodable")
    }

    /// Decodes without a size limit. Trailing bytes other than whitespace are
    /// rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Size-bounded encoder/decoder used by the actor.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    max_message_size: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl Codec {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn encode(&self, message: &Message) -> Vec<u8> {
        message.to_bytes()
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Message, DecodeError> {
        if bytes.len() > self.max_message_size {
            return Err(DecodeError::Oversized {
                size: bytes.len(),
                max: self.max_message_size,
            });
        }
        Message::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockHeader, TxInput, TxOutput};

    fn block(height: u64) -> Block {
        Block::new(
            BlockHeader {
                version: 1,
                height,
                previous_hash: Blake2bHash::hash(height.to_le_bytes()),
                merkle_root: Blake2bHash::zero(),
                timestamp: 1_700_000_000 + height,
                nonce: height * 31,
            },
            vec![transaction(height)],
        )
    }

    fn transaction(seed: u64) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_tx: Blake2bHash::hash(seed.to_be_bytes()),
                output_index: 1,
                signature: vec![0xde, 0xad, 0xbe, 0xef],
            }],
            outputs: vec![TxOutput {
                amount: seed + 1,
                recipient: Blake2bHash::hash(b"bob"),
            }],
            timestamp: 1_700_000_000,
        }
    }

    fn all_messages() -> Vec<Message> {
        vec![
            Message::NewBlock { block: block(1) },
            Message::NewTransaction {
                transaction: transaction(9),
            },
            Message::Status {
                height: 42,
                best_block_hash: Blake2bHash::hash(b"best"),
                protocol_version: PROTOCOL_VERSION,
            },
            Message::GetBlocks {
                start_height: 100,
                count: 10,
            },
            Message::Blocks {
                blocks: vec![block(1), block(2), block(3)],
            },
            Message::Blocks { blocks: vec![] },
            Message::GetStatus,
            Message::Ping { nonce: u64::MAX },
            Message::Pong { nonce: 0 },
        ]
    }

    #[test]
    fn every_variant_roundtrips() {
        let codec = Codec::default();
        for message in all_messages() {
            let bytes = codec.encode(&message);
            assert_eq!(codec.decode(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        for message in all_messages() {
            assert_eq!(message.to_bytes(), message.clone().to_bytes());
        }
    }

    #[test]
    fn truncated_prefixes_never_decode() {
        for message in all_messages() {
            let bytes = message.to_bytes();
            for len in 0..bytes.len() {
                assert!(
                    Message::from_bytes(&bytes[..len]).is_err(),
                    "prefix of {} bytes of {} decoded",
                    len,
                    message.message_type()
                );
            }
        }
    }

    #[test]
    fn unknown_variant_is_rejected() {
        assert!(Message::from_bytes(br#"{"Gossip":{"x":1}}"#).is_err());
        assert!(Message::from_bytes(br#""GetStatusX""#).is_err());
        assert!(Message::from_bytes(br#"{"Ping":{"nonce":-1}}"#).is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(Message::from_bytes(br#"{"Ping":{"nonce":1,"junk":2}}"#).is_err());
        assert!(Message::from_bytes(br#"{"GetBlocks":{"start_height":1,"count":2,"peer":3}}"#).is_err());
        let mut block = serde_json::to_value(block(1)).unwrap();
        block["header"]["extra"] = serde_json::json!(true);
        let payload = serde_json::json!({ "NewBlock": { "block": block } });
        assert!(Message::from_bytes(payload.to_string().as_bytes()).is_err());
        // Status without a protocol version (supply-carrying shape).
        let legacy_status = format!(
            r#"{{"Status":{{"height":1,"best_block_hash":"{}","total_supply":5}}}}"#,
            Blake2bHash::zero()
        );
        assert!(Message::from_bytes(legacy_status.as_bytes()).is_err());
        assert_eq!(
            Message::from_bytes(br#"{"Ping":{"nonce":1}}"#).unwrap(),
            Message::Ping { nonce: 1 }
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = Message::Ping { nonce: 5 }.to_bytes();
        bytes.extend_from_slice(b"{}");
        assert!(Message::from_bytes(&bytes).is_err());
    }

    #[test]
    fn codec_enforces_size_limit() {
        let message = Message::Blocks {
            blocks: vec![block(1), block(2)],
        };
        let bytes = message.to_bytes();
        let codec = Codec::new(bytes.len() - 1);
        match codec.decode(&bytes) {
            Err(DecodeError::Oversized { size, max }) => {
                assert_eq!(size, bytes.len());
                assert_eq!(max, bytes.len() - 1);
            }
            other => panic!("expected oversized error, got {:?}", other),
        }
        assert_eq!(Codec::new(bytes.len()).decode(&bytes).unwrap(), message);
    }

    #[test]
    fn message_type_names() {
        assert_eq!(Message::GetStatus.message_type().as_str(), "GetStatus");
        assert_eq!(
            Message::Blocks { blocks: vec![] }.message_type().to_string(),
            "Blocks"
        );
    }
}
