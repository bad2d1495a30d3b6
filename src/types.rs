//! Chain value types carried over the network.
//!
//! The relay treats these as opaque payloads: it clones, encodes and hashes
//! them but never checks them against chain rules.

use serde::{Deserialize, Serialize};

use crate::hash::Blake2bHash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockHeader {
    pub version: u32,
    pub height: u64,
    pub previous_hash: Blake2bHash,
    pub merkle_root: Blake2bHash,
    /// Unix timestamp in seconds
    pub timestamp: u64,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn hash(&self) -> Blake2bHash {
        let mut data = Vec::with_capacity(4 + 8 + 32 + 32 + 8 + 8);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(&self.height.to_le_bytes());
        data.extend_from_slice(self.previous_hash.as_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        Blake2bHash::hash(data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn hash(&self) -> Blake2bHash {
        self.header.hash()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TxInput {
    pub previous_tx: Blake2bHash,
    pub output_index: u32,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TxOutput {
    pub amount: u64,
    pub recipient: Blake2bHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub timestamp: u64,
}

impl Transaction {
    /// Hash over the little-endian field bytes. Variable-length parts are
    /// length-prefixed, so distinct transactions never share a preimage.
    pub fn hash(&self) -> Blake2bHash {
        let mut data = Vec::new();
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(&(self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            data.extend_from_slice(input.previous_tx.as_bytes());
            data.extend_from_slice(&input.output_index.to_le_bytes());
            data.extend_from_slice(&(input.signature.len() as u64).to_le_bytes());
            data.extend_from_slice(&input.signature);
        }
        data.extend_from_slice(&(self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            data.extend_from_slice(&output.amount.to_le_bytes());
            data.extend_from_slice(output.recipient.as_bytes());
        }
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        Blake2bHash::hash(data)
    }
}
