//! In-memory proof storage for tests and tooling.

use crate::{proof_point, BlockStorageView, ProofStorage, StorageError};
use keystone_chain::FinalizationProof;
use keystone_types::{FinalizationMessage, FinalizationPoint, Hash, Height, HeightHashPair};
use parking_lot::RwLock;
use std::collections::BTreeMap;

struct Inner {
    finalization_point: FinalizationPoint,
    finalized_height: Height,
    proofs: BTreeMap<u64, Vec<FinalizationMessage>>,
    pairs: BTreeMap<u64, HeightHashPair>,
}

/// Proof storage held entirely in memory.
pub struct MemoryProofStorage {
    inner: RwLock<Inner>,
}

impl MemoryProofStorage {
    /// Create storage at the nemesis state (point 1, height 1).
    pub fn new() -> Self {
        Self::with_state(FinalizationPoint(1), Height(1))
    }

    /// Create storage pretending `point` was finalized at `height`.
    pub fn with_state(point: FinalizationPoint, height: Height) -> Self {
        Self {
            inner: RwLock::new(Inner {
                finalization_point: point,
                finalized_height: height,
                proofs: BTreeMap::new(),
                pairs: BTreeMap::new(),
            }),
        }
    }
}

impl Default for MemoryProofStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProofStorage for MemoryProofStorage {
    fn finalization_point(&self) -> Result<FinalizationPoint, StorageError> {
        Ok(self.inner.read().finalization_point)
    }

    fn finalized_height(&self) -> Result<Height, StorageError> {
        Ok(self.inner.read().finalized_height)
    }

    fn save_proof(
        &self,
        height_hash_pair: &HeightHashPair,
        proof: &FinalizationProof,
    ) -> Result<(), StorageError> {
        let point = proof_point(proof)?;

        let mut inner = self.inner.write();
        inner
            .proofs
            .insert(point.0, proof.iter().map(|message| (**message).clone()).collect());
        inner.pairs.insert(point.0, *height_hash_pair);
        inner.finalization_point = point;
        inner.finalized_height = height_hash_pair.height;
        Ok(())
    }

    fn load_proof(
        &self,
        point: FinalizationPoint,
    ) -> Result<Vec<FinalizationMessage>, StorageError> {
        self.inner.read().proofs.get(&point.0).cloned().ok_or(StorageError::ProofNotFound(point))
    }

    fn load_finalized_hashes_from(
        &self,
        point: FinalizationPoint,
        max_hashes: usize,
    ) -> Result<Vec<HeightHashPair>, StorageError> {
        let inner = self.inner.read();
        Ok(inner.pairs.range(point.0..).take(max_hashes).map(|(_, pair)| *pair).collect())
    }
}

/// Block storage view backed by a fixed map of generation hashes.
pub struct MemoryBlockStorage {
    generation_hashes: BTreeMap<u64, Hash>,
}

impl MemoryBlockStorage {
    /// Create a view over `(height, generation hash)` entries.
    pub fn new(entries: impl IntoIterator<Item = (Height, Hash)>) -> Self {
        Self {
            generation_hashes: entries.into_iter().map(|(height, hash)| (height.0, hash)).collect(),
        }
    }
}

impl BlockStorageView for MemoryBlockStorage {
    fn load_generation_hash(&self, height: Height) -> Result<Hash, StorageError> {
        self.generation_hashes
            .get(&height.0)
            .copied()
            .ok_or(StorageError::BlockNotFound(height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_types::{KeyPair, Signature, StepIdentifier, VoteSignature, VrfProof};
    use std::sync::Arc;

    fn make_proof(point: u64) -> FinalizationProof {
        vec![Arc::new(FinalizationMessage {
            step: StepIdentifier::new(point, 8, 4),
            height: Height(100 + point),
            signature: VoteSignature {
                voting_public_key: KeyPair::generate().public_key(),
                signature: Signature::zero(),
            },
            sortition_proof: VrfProof::zero(),
            hashes: vec![Hash::from_bytes(b"finalized")],
        })]
    }

    #[test]
    fn test_initial_state_is_nemesis() {
        let storage = MemoryProofStorage::new();

        assert_eq!(storage.finalization_point().unwrap(), FinalizationPoint(1));
        assert_eq!(storage.finalized_height().unwrap(), Height(1));
    }

    #[test]
    fn test_save_proof_advances_indexes() {
        let storage = MemoryProofStorage::new();
        let pair = HeightHashPair::new(Height(102), Hash::from_bytes(b"finalized"));

        storage.save_proof(&pair, &make_proof(2)).unwrap();

        assert_eq!(storage.finalization_point().unwrap(), FinalizationPoint(2));
        assert_eq!(storage.finalized_height().unwrap(), Height(102));
    }

    #[test]
    fn test_save_empty_proof_is_rejected() {
        let storage = MemoryProofStorage::new();
        let pair = HeightHashPair::new(Height(102), Hash::from_bytes(b"finalized"));

        assert!(matches!(storage.save_proof(&pair, &vec![]), Err(StorageError::EmptyProof)));
    }

    #[test]
    fn test_load_proof_roundtrip() {
        let storage = MemoryProofStorage::new();
        let proof = make_proof(2);
        let pair = HeightHashPair::new(Height(102), Hash::from_bytes(b"finalized"));
        storage.save_proof(&pair, &proof).unwrap();

        let loaded = storage.load_proof(FinalizationPoint(2)).unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(&loaded[0], proof[0].as_ref());
        assert!(matches!(
            storage.load_proof(FinalizationPoint(3)),
            Err(StorageError::ProofNotFound(FinalizationPoint(3)))
        ));
    }

    #[test]
    fn test_load_finalized_hashes_scans_forward() {
        let storage = MemoryProofStorage::new();
        for point in 2..6 {
            let pair = HeightHashPair::new(Height(100 + point), Hash::from_bytes(b"finalized"));
            storage.save_proof(&pair, &make_proof(point)).unwrap();
        }

        let pairs = storage.load_finalized_hashes_from(FinalizationPoint(3), 2).unwrap();

        assert_eq!(
            pairs.iter().map(|pair| pair.height).collect::<Vec<_>>(),
            vec![Height(103), Height(104)]
        );
    }

    #[test]
    fn test_block_storage_view_lookup() {
        let hash = Hash::from_bytes(b"generation");
        let storage = MemoryBlockStorage::new([(Height(7), hash)]);

        assert_eq!(storage.load_generation_hash(Height(7)).unwrap(), hash);
        assert!(matches!(
            storage.load_generation_hash(Height(8)),
            Err(StorageError::BlockNotFound(Height(8)))
        ));
    }
}
