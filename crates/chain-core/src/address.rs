// chain-core/src/address.rs

use crate::{hash::Hash, ChainError, ChainResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Account or contract address
///
/// The all-zero address doubles as the burn address: LP shares assigned to
/// it can never be moved again.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// Create address from bytes
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derive an address from a domain tag and a list of seeds
    /// (last 20 bytes of `sha256(domain || seeds...)`, similar to CREATE2)
    pub fn derive(domain: &[u8], seeds: &[&[u8]]) -> Self {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(seeds.len() + 1);
        parts.push(domain);
        parts.extend_from_slice(seeds);

        let hash = Hash::of_parts(&parts);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash.as_bytes()[12..32]);
        Self(address)
    }

    /// Deterministic address for a human-readable label (accounts, tokens in fixtures)
    pub fn from_label(label: &str) -> Self {
        Self::derive(b"label", &[label.as_bytes()])
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> ChainResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)
            .map_err(|e| ChainError::DeserializationError(e.to_string()))?;
        if bytes.len() != 20 {
            return Err(ChainError::DeserializationError("Invalid address length".into()));
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn zero() -> Self {
        Self([0u8; 20])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
