//! The signed vote message exchanged between validators.
//!
//! Wire layout (little-endian, fixed header followed by the hash list):
//!
//! ```text
//! hashes_count   u32
//! signature      signer public key (32) + signature (64)
//! step           point (8) + round (8) + sub_round (8)
//! height         u64
//! sortition      VRF proof (64)
//! hashes         hashes_count * 32
//! ```
//!
//! The signature covers everything *after* itself (step onward), so replaying
//! a message with altered header fields cannot change which bytes were
//! signed. Total size is always [`MESSAGE_HEADER_SIZE`] plus 32 bytes per
//! hash.

use crate::{Hash, Height, PublicKey, Signature, StepIdentifier, VrfProof};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of a serialized message with no hashes.
pub const MESSAGE_HEADER_SIZE: usize = 4 + 32 + 64 + 24 + 8 + 64;

/// The one-time signature carried by a message: the voting public key of the
/// signer together with its signature over the signed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSignature {
    /// Voting public key of the signer.
    pub voting_public_key: PublicKey,
    /// Signature over the signed region.
    pub signature: Signature,
}

/// A signed finalization vote.
///
/// `hashes` holds the voting targets: the full target for the k-th hash is
/// `(height + k, hashes[k])`. Single-block votes carry one hash;
/// chain-proposal votes carry the anchor followed by the proposed extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationMessage {
    /// Which consensus stage this vote is for.
    pub step: StepIdentifier,
    /// Height of the first hash.
    pub height: Height,
    /// One-time signature over the signed region.
    pub signature: VoteSignature,
    /// VRF sortition proof, evaluated over `generation_hash || step`.
    pub sortition_proof: VrfProof,
    /// Ordered voting targets starting at `height`.
    pub hashes: Vec<Hash>,
}

/// Decode failure for a serialized message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageDecodeError {
    /// Fewer bytes than the fixed header.
    #[error("message truncated: {0} bytes")]
    Truncated(usize),
    /// Total size disagrees with the hash count in the header.
    #[error("message size {actual} does not match hashes count {hashes_count}")]
    SizeMismatch {
        /// Actual byte length received.
        actual: usize,
        /// Hash count claimed by the header.
        hashes_count: u32,
    },
}

impl FinalizationMessage {
    /// The voting public key that signed this message.
    pub fn signer(&self) -> PublicKey {
        self.signature.voting_public_key
    }

    /// Serialized size in bytes.
    pub fn serialized_size(&self) -> usize {
        MESSAGE_HEADER_SIZE + self.hashes.len() * Hash::SIZE
    }

    /// The bytes covered by the signature: everything after the signature
    /// field in wire order.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(24 + 8 + 64 + self.hashes.len() * Hash::SIZE);
        bytes.extend_from_slice(&self.step.to_bytes());
        bytes.extend_from_slice(&self.height.0.to_le_bytes());
        bytes.extend_from_slice(self.sortition_proof.as_bytes());
        for hash in &self.hashes {
            bytes.extend_from_slice(hash.as_bytes());
        }
        bytes
    }

    /// Serialize to the wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.serialized_size());
        bytes.extend_from_slice(&(self.hashes.len() as u32).to_le_bytes());
        bytes.extend_from_slice(self.signature.voting_public_key.as_bytes());
        bytes.extend_from_slice(self.signature.signature.as_bytes());
        bytes.extend_from_slice(&self.signing_bytes());
        bytes
    }

    /// Decode from the wire layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageDecodeError> {
        if bytes.len() < MESSAGE_HEADER_SIZE {
            return Err(MessageDecodeError::Truncated(bytes.len()));
        }

        let hashes_count = u32::from_le_bytes(bytes[..4].try_into().unwrap());
        let expected = MESSAGE_HEADER_SIZE.saturating_add(hashes_count as usize * Hash::SIZE);
        if bytes.len() != expected {
            return Err(MessageDecodeError::SizeMismatch { actual: bytes.len(), hashes_count });
        }

        let voting_public_key = PublicKey::from_bytes(bytes[4..36].try_into().unwrap());
        let signature = Signature::from_bytes(bytes[36..100].try_into().unwrap());
        let step = StepIdentifier::from_bytes(&bytes[100..124].try_into().unwrap());
        let height = Height(u64::from_le_bytes(bytes[124..132].try_into().unwrap()));
        let sortition_proof = VrfProof::from_bytes(bytes[132..196].try_into().unwrap());

        let hashes = bytes[MESSAGE_HEADER_SIZE..]
            .chunks_exact(Hash::SIZE)
            .map(|chunk| Hash::from_raw(chunk.try_into().unwrap()))
            .collect();

        Ok(Self {
            step,
            height,
            signature: VoteSignature { voting_public_key, signature },
            sortition_proof,
            hashes,
        })
    }

    /// Content hash over the full wire representation.
    pub fn content_hash(&self) -> Hash {
        Hash::from_bytes(&self.to_bytes())
    }
}
