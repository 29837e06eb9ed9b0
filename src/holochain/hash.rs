//! Content-addressed hashes
//!
//! Hashes are opaque byte sequences. Equality and hashing are defined over
//! the bytes; the canonical string form is `u` followed by the url-safe,
//! unpadded base64 encoding of the bytes.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Kind of hash, identified by its 3-byte prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    Agent,
    Entry,
    DhtOp,
    Action,
    Dna,
}

impl HashType {
    /// Prefix bytes (`hCAk`, `hCEk`, `hCQk`, `hCkk`, `hC0k` in base64)
    pub const fn prefix(self) -> [u8; 3] {
        match self {
            HashType::Agent => [0x84, 0x20, 0x24],
            HashType::Entry => [0x84, 0x21, 0x24],
            HashType::DhtOp => [0x84, 0x24, 0x24],
            HashType::Action => [0x84, 0x29, 0x24],
            HashType::Dna => [0x84, 0x2d, 0x24],
        }
    }

    fn from_prefix(prefix: &[u8]) -> Option<Self> {
        [
            HashType::Agent,
            HashType::Entry,
            HashType::DhtOp,
            HashType::Action,
            HashType::Dna,
        ]
        .into_iter()
        .find(|t| t.prefix() == prefix)
    }
}

/// A hash compared by byte content
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HoloHash(Vec<u8>);

pub type ActionHash = HoloHash;
pub type EntryHash = HoloHash;
pub type AgentPubKey = HoloHash;
pub type DnaHash = HoloHash;
pub type AnyDhtHash = HoloHash;
pub type AnyLinkableHash = HoloHash;

impl HoloHash {
    pub fn from_raw(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Build a hash of the given type from a 32-byte core and 4-byte location
    pub fn from_parts(hash_type: HashType, core: [u8; 32], location: [u8; 4]) -> Self {
        let mut bytes = Vec::with_capacity(39);
        bytes.extend_from_slice(&hash_type.prefix());
        bytes.extend_from_slice(&core);
        bytes.extend_from_slice(&location);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// The hash type from the prefix, if recognised
    pub fn hash_type(&self) -> Option<HashType> {
        self.0.get(..3).and_then(HashType::from_prefix)
    }

    /// The same hash core under a different type prefix
    pub fn retype(&self, hash_type: HashType) -> Self {
        let mut bytes = hash_type.prefix().to_vec();
        bytes.extend_from_slice(self.0.get(3..).unwrap_or_default());
        Self(bytes)
    }

    /// Canonical string form
    pub fn to_base64(&self) -> String {
        format!("u{}", URL_SAFE_NO_PAD.encode(&self.0))
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let body = encoded
            .strip_prefix('u')
            .ok_or_else(|| StoreError::InvalidHash(format!("missing 'u' prefix: {encoded}")))?;
        Ok(Self(URL_SAFE_NO_PAD.decode(body)?))
    }
}

impl fmt::Display for HoloHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for HoloHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HoloHash({})", self.to_base64())
    }
}

impl FromStr for HoloHash {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base64(s)
    }
}

impl From<Vec<u8>> for HoloHash {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for HoloHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Remove duplicate hashes, keeping the first occurrence of each
pub fn uniquify(hashes: Vec<HoloHash>) -> Vec<HoloHash> {
    let mut seen = std::collections::HashSet::new();
    hashes.into_iter().filter(|h| seen.insert(h.clone())).collect()
}
