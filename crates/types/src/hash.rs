//! Content hashes and their 4-byte gossip abbreviation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte content hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The all-zero hash.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Size of a hash in bytes.
    pub const SIZE: usize = 32;

    /// Hash arbitrary bytes with SHA-256.
    pub fn from_bytes(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Hash(digest.into())
    }

    /// Wrap an existing 32-byte digest.
    pub fn from_raw(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 4 bytes of the hash, used as a lightweight gossip identifier.
    pub fn short(&self) -> ShortHash {
        ShortHash(u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash(")?;
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// First 4 bytes of a content hash.
///
/// Used by gossip synchronization to describe which messages a peer already
/// knows without shipping full hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShortHash(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_is_deterministic() {
        let a = Hash::from_bytes(b"payload");
        let b = Hash::from_bytes(b"payload");
        let c = Hash::from_bytes(b"other payload");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_short_hash_takes_first_four_bytes() {
        let mut raw = [0u8; 32];
        raw[0] = 0x01;
        raw[1] = 0x02;
        raw[2] = 0x03;
        raw[3] = 0x04;
        raw[4] = 0xff;

        let hash = Hash::from_raw(raw);
        assert_eq!(hash.short(), ShortHash(0x0403_0201));
    }

    #[test]
    fn test_display_is_full_hex() {
        let hash = Hash::ZERO;
        assert_eq!(hash.to_string(), "0".repeat(64));
    }
}
