//! Durable storage for finalization proofs.
//!
//! [`ProofStorage`] is the contract the node core consumes: the last
//! finalized point and height, proof persistence, and a forward scan of
//! finalized `(height, hash)` pairs. [`RocksProofStorage`] is the production
//! implementation; [`MemoryProofStorage`] backs tests and tooling.
//!
//! [`BlockStorageView`] is the thin read view of block storage the context
//! factory uses to obtain the generation hash of the finalized tip.

mod memory;
mod rocks;

pub use memory::{MemoryBlockStorage, MemoryProofStorage};
pub use rocks::RocksProofStorage;

use keystone_chain::FinalizationProof;
use keystone_types::{FinalizationMessage, FinalizationPoint, Hash, Height, HeightHashPair};
use thiserror::Error;

/// Storage errors. These indicate local corruption or misuse and are
/// propagated; nothing a remote peer sends can produce one.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(String),
    /// A stored record could not be decoded.
    #[error("codec error: {0}")]
    Codec(String),
    /// No proof is stored for the requested point.
    #[error("no proof stored for point {0}")]
    ProofNotFound(FinalizationPoint),
    /// A proof must contain at least one message.
    #[error("cannot save an empty proof")]
    EmptyProof,
    /// No block is stored at the requested height.
    #[error("no block stored at height {0}")]
    BlockNotFound(Height),
}

/// Durable proof storage.
///
/// The initial state is the nemesis: finalization point 1 at height 1.
/// `save_proof` must be durable before returning.
pub trait ProofStorage: Send + Sync {
    /// The last finalized point.
    fn finalization_point(&self) -> Result<FinalizationPoint, StorageError>;

    /// The height of the last finalized block.
    fn finalized_height(&self) -> Result<Height, StorageError>;

    /// Persist the proof that finalized `height_hash_pair`. The finalized
    /// point is taken from the proof's messages.
    fn save_proof(
        &self,
        height_hash_pair: &HeightHashPair,
        proof: &FinalizationProof,
    ) -> Result<(), StorageError>;

    /// Load a previously saved proof.
    fn load_proof(&self, point: FinalizationPoint)
        -> Result<Vec<FinalizationMessage>, StorageError>;

    /// Finalized `(height, hash)` pairs for points in
    /// `[point, point + max_hashes)`, in point order. Points without a stored
    /// pair are skipped.
    fn load_finalized_hashes_from(
        &self,
        point: FinalizationPoint,
        max_hashes: usize,
    ) -> Result<Vec<HeightHashPair>, StorageError>;
}

/// Read view of block storage: the single lookup the finalization context
/// needs.
pub trait BlockStorageView: Send + Sync {
    /// The generation hash of the block at `height`.
    fn load_generation_hash(&self, height: Height) -> Result<Hash, StorageError>;
}

/// The finalization point attested by a proof, taken from its first message.
fn proof_point(proof: &FinalizationProof) -> Result<FinalizationPoint, StorageError> {
    proof
        .first()
        .map(|message| message.step.finalization_point())
        .ok_or(StorageError::EmptyProof)
}
