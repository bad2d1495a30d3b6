use blake2_rfc::blake2b::Blake2b;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const BLAKE2B_LENGTH: usize = 32;

/// Blake2b-256 digest used for block, transaction and message identities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Blake2bHash([u8; BLAKE2B_LENGTH]);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HashParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected 32 bytes, got {0}")]
    Length(usize),
}

impl Serialize for Blake2bHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        hex::encode(self.0).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Blake2bHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_str = String::deserialize(deserializer)?;
        hex_str.parse().map_err(serde::de::Error::custom)
    }
}

impl Blake2bHash {
    pub const LEN: usize = BLAKE2B_LENGTH;

    pub fn zero() -> Self {
        Self([0u8; BLAKE2B_LENGTH])
    }

    pub fn from_bytes(bytes: [u8; BLAKE2B_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BLAKE2B_LENGTH] {
        &self.0
    }

    pub fn hash<T: AsRef<[u8]>>(data: T) -> Self {
        let mut hasher = Blake2b::new(BLAKE2B_LENGTH);
        hasher.update(data.as_ref());
        let digest = hasher.finalize();
        let mut out = [0u8; BLAKE2B_LENGTH];
        out.copy_from_slice(digest.as_bytes());
        Self(out)
    }

    /// First four bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl AsRef<[u8]> for Blake2bHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Blake2bHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl TryFrom<&[u8]> for Blake2bHash {
    type Error = HashParseError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; BLAKE2B_LENGTH] = bytes
            .try_into()
            .map_err(|_| HashParseError::Length(bytes.len()))?;
        Ok(Self(array))
    }
}

impl FromStr for Blake2bHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::try_from(bytes.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(Blake2bHash::hash(b"block"), Blake2bHash::hash(b"block"));
        assert_ne!(Blake2bHash::hash(b"block"), Blake2bHash::hash(b"blocks"));
        assert_ne!(Blake2bHash::hash(b""), Blake2bHash::zero());
    }

    #[test]
    fn hex_string_roundtrip() {
        let hash = Blake2bHash::hash(b"abc");
        let parsed: Blake2bHash = hash.to_string().parse().unwrap();
        assert_eq!(parsed, hash);
        assert_eq!(hash.short().len(), 8);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            "abcd".parse::<Blake2bHash>(),
            Err(HashParseError::Length(2))
        ));
        assert!(matches!(
            "zz".parse::<Blake2bHash>(),
            Err(HashParseError::Hex(_))
        ));
    }

    #[test]
    fn serializes_as_hex() {
        let hash = Blake2bHash::from_bytes([0xab; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let back: Blake2bHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
        assert!(serde_json::from_str::<Blake2bHash>("\"abab\"").is_err());
    }
}
