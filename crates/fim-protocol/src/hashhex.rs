//! Lowercase-hex wire encoding for the raw 32-byte digests `fim-merkle`
//! produces internally (spec §6: "All hash fields in requests are lowercase
//! hex").

use fim_merkle::Hash;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexHash(pub Hash);

impl From<Hash> for HexHash {
    fn from(h: Hash) -> Self {
        HexHash(h)
    }
}

impl From<HexHash> for Hash {
    fn from(h: HexHash) -> Self {
        h.0
    }
}

impl fmt::Display for HexHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed hex hash: {0}")]
pub struct HexHashParseError(String);

impl FromStr for HexHash {
    type Err = HexHashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| HexHashParseError(e.to_string()))?;
        let arr: Hash = bytes
            .try_into()
            .map_err(|_| HexHashParseError(format!("expected 32 bytes, got hex of other length: {s}")))?;
        Ok(HexHash(arr))
    }
}

impl Serialize for HexHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HexHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
