//! Verifiable random function built on deterministic ed25519 signatures.
//!
//! The proof is the signer's deterministic signature over the input; anyone
//! holding the public key can check it, and the output is the SHA-256 digest
//! of the proof. Because RFC 8032 signing is deterministic, prover and
//! verifier derive the same output, and the signer cannot grind for a
//! different one without a different key.

use crate::crypto::serde_bytes_64;
use crate::{KeyPair, PublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A VRF proof: the deterministic signature over the evaluated input.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfProof(#[serde(with = "serde_bytes_64")] [u8; 64]);

impl VrfProof {
    /// Evaluate the VRF for `input` under `key_pair`.
    pub fn generate(input: &[u8], key_pair: &KeyPair) -> Self {
        VrfProof(*key_pair.sign(input).as_bytes())
    }

    /// Verify the proof against `input` and `public_key`, returning the VRF
    /// output on success.
    pub fn verify(&self, input: &[u8], public_key: &PublicKey) -> Option<VrfOutput> {
        let signature = crate::Signature::from_bytes(self.0);
        if !public_key.verify(input, &signature) {
            return None;
        }
        Some(self.output())
    }

    /// The output this proof hashes to. Only meaningful after verification;
    /// the prover uses it directly because it produced the proof itself.
    pub fn output(&self) -> VrfOutput {
        VrfOutput(Sha256::digest(self.0).into())
    }

    /// Proof whose bytes are all zero. Never verifies.
    pub fn zero() -> Self {
        VrfProof([0u8; 64])
    }

    /// Wrap raw proof bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        VrfProof(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for VrfProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VrfProof(")?;
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

/// The 32-byte VRF output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VrfOutput([u8; 32]);

impl VrfOutput {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// A uniform 64-bit draw taken from the output, used by sortition.
    pub fn draw(&self) -> u64 {
        u64::from_le_bytes(self.0[..8].try_into().unwrap())
    }
}
