//! Content digest used as the address of every stored blob.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated md5 content digest.
///
/// Rendered everywhere (database, file names, JSON) as 32 lowercase hex
/// characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 16]);

/// Error returned when a string is not a well-formed digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidDigest(pub String);

impl fmt::Display for InvalidDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid digest: {}", self.0)
    }
}

impl std::error::Error for InvalidDigest {}

impl ContentDigest {
    /// Digest of an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }

    pub fn from_hex(s: &str) -> Result<Self, InvalidDigest> {
        if s.len() != 32 {
            return Err(InvalidDigest(format!(
                "expected 32 hex characters, got {}",
                s.len()
            )));
        }
        let bytes = hex::decode(s).map_err(|e| InvalidDigest(format!("invalid hex: {e}")))?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| InvalidDigest("decoded to wrong length".into()))?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for ContentDigest {
    type Err = InvalidDigest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_matches_known_md5() {
        let digest = ContentDigest::compute(b"hello world");
        assert_eq!(digest.to_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(ContentDigest::from_hex("abc").is_err());
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        assert!(ContentDigest::from_hex("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn from_hex_accepts_uppercase_and_renders_lowercase() {
        let digest = ContentDigest::from_hex("5EB63BBBE01EEED093CB22BB8F5ACDC3").unwrap();
        assert_eq!(digest.to_string(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn deserialize_rejects_garbage() {
        let parsed: Result<ContentDigest, _> = serde_json::from_str("\"not-a-digest\"");
        assert!(parsed.is_err());
    }
}
