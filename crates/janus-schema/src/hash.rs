//! Content identifiers.
//!
//! A [`ContentId`] is the BLAKE3 digest of a blob as the store holds it.
//! It travels as 64 lowercase hex characters, both in blob directory names
//! and in `JANUS.lock`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced when parsing a [`ContentId`] from its hex form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentIdError {
    /// The input is not exactly 64 characters long.
    #[error("Invalid content id: expected 64 hex characters, got {0}")]
    InvalidLength(usize),

    /// The input contains characters outside `[0-9a-fA-F]`.
    #[error("Invalid content id: contains non-hex characters in '{0}'")]
    InvalidHex(String),
}

/// A 256-bit BLAKE3 digest of stored content.
///
/// Two blobs with the same bytes always carry the same id, on any
/// platform and in any run. The id is the only key the content-addressed
/// store understands, and it renders as 64 lowercase hex characters both on
/// disk and in `JANUS.lock`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId([u8; 32]);

impl ContentId {
    /// Length of the digest in bytes.
    pub const LEN: usize = 32;

    /// Wrap raw digest bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// BLAKE3 of `data` exactly as given.
    ///
    /// No normalization happens here; callers that want platform-stable ids
    /// hash through the store's normalizer instead.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string.
    ///
    /// # Errors
    ///
    /// Returns [`ContentIdError`] if the input has the wrong length or is not hex.
    pub fn from_hex(s: &str) -> Result<Self, ContentIdError> {
        if s.len() != Self::LEN * 2 {
            return Err(ContentIdError::InvalidLength(s.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| ContentIdError::InvalidHex(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// First eight hex characters, for log lines and prompts.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.short())
    }
}

impl FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ContentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = ContentId::digest(b"test data");
        let b = ContentId::digest(b"test data");
        assert_eq!(a, b);
        assert_ne!(a, ContentId::digest(b"other data"));
    }

    #[test]
    fn hex_is_lowercase_and_parses_back() {
        let id = ContentId::digest(b"hello world");
        let hex = id.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_eq!(ContentId::from_hex(&hex).unwrap(), id);
        assert_eq!(ContentId::from_hex(&hex.to_uppercase()).unwrap(), id);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert_eq!(
            ContentId::from_hex("abc"),
            Err(ContentIdError::InvalidLength(3))
        );
        let bad = "z".repeat(64);
        assert!(matches!(
            ContentId::from_hex(&bad),
            Err(ContentIdError::InvalidHex(_))
        ));
    }

    #[test]
    fn serializes_as_hex_string() {
        let id = ContentId::digest(b"lock me");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let back: ContentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
