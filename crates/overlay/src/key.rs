//! 160-bit overlay keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// The number of bytes in an overlay key.
pub const HASH_LEN: usize = 20;

//================================================================================================
// Types
//================================================================================================

/// A 160-bit overlay key.
///
/// Keys are derived from byte strings with [`InfoHash::get`], which
/// truncates a BLAKE3 digest to twenty bytes. The all-zero key is reserved
/// as a tombstone sentinel and never produced by derivation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct InfoHash([u8; HASH_LEN]);

/// An error produced when parsing an [`InfoHash`] from hex.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    /// The input was not exactly forty hex digits.
    #[error("overlay keys are {expected} hex digits, got {0}", expected = HASH_LEN * 2)]
    BadLength(usize),
    /// The input contained a non-hex character.
    #[error("invalid hex in overlay key: {0}")]
    BadHex(String),
}

//================================================================================================
// Impls
//================================================================================================

impl InfoHash {
    /// Derives the key for a byte string.
    pub fn get(data: impl AsRef<[u8]>) -> Self {
        let digest = blake3::hash(data.as_ref());
        let mut bytes = [0u8; HASH_LEN];
        bytes.copy_from_slice(&digest.as_bytes()[..HASH_LEN]);
        InfoHash(bytes)
    }

    /// The all-zero sentinel key.
    pub fn zero() -> Self {
        InfoHash([0u8; HASH_LEN])
    }

    /// Whether this is the all-zero sentinel.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Reconstructs a key from its raw bytes, if the slice has the right
    /// length.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(InfoHash(bytes))
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for InfoHash {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != HASH_LEN * 2 {
            return Err(KeyError::BadLength(s.len()));
        }
        let bytes = hex::decode(s).map_err(|_| KeyError::BadHex(s.to_string()))?;
        Ok(InfoHash::from_bytes(&bytes).unwrap_or_else(InfoHash::zero))
    }
}

// Keys travel as hex strings on the peer wire.
impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_pure() {
        assert_eq!(InfoHash::get("(Concept \"foobar\")"), InfoHash::get("(Concept \"foobar\")"));
        assert_ne!(InfoHash::get("a"), InfoHash::get("b"));
    }

    #[test]
    fn hex_round_trip() {
        let key = InfoHash::get("testspace/");
        let hex = key.to_string();
        assert_eq!(hex.len(), 40);
        assert_eq!(hex.parse::<InfoHash>().unwrap(), key);
    }

    #[test]
    fn bad_hex_rejected() {
        assert_eq!("zz".parse::<InfoHash>().unwrap_err(), KeyError::BadLength(2));
        let not_hex = "g".repeat(40);
        assert!(matches!(not_hex.parse::<InfoHash>(), Err(KeyError::BadHex(_))));
    }

    #[test]
    fn zero_sentinel() {
        assert!(InfoHash::zero().is_zero());
        assert!(!InfoHash::get("").is_zero());
    }
}
