//! Immutable snapshot of the validator set at a finalized point.

use crate::{FinalizationConfig, FinalizationPoint, Hash, Height, PublicKey};
use std::collections::HashMap;

/// A voting-eligible account as supplied by the account-state view.
///
/// `registered_from ..= registered_to` is the finalization-point range for
/// which the voting key is registered.
#[derive(Debug, Clone)]
pub struct VoterRecord {
    /// Registered voting public key.
    pub voting_public_key: PublicKey,
    /// VRF public key used for sortition.
    pub vrf_public_key: PublicKey,
    /// Vote weight (stake).
    pub weight: u64,
    /// First point the voting key is registered for.
    pub registered_from: FinalizationPoint,
    /// Last point the voting key is registered for (inclusive).
    pub registered_to: FinalizationPoint,
}

/// Per-voter data retained by the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoterEntry {
    /// Vote weight (stake).
    pub weight: u64,
    /// VRF public key used for sortition.
    pub vrf_public_key: PublicKey,
}

/// Snapshot of the validator set captured when building a per-step
/// aggregator. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct FinalizationContext {
    point: FinalizationPoint,
    height: Height,
    generation_hash: Hash,
    config: FinalizationConfig,
    total_weight: u64,
    voters: HashMap<PublicKey, VoterEntry>,
}

impl FinalizationContext {
    /// Build a context for `point` from the supplied voter records.
    ///
    /// Records whose registration window does not contain `point`, and
    /// records with zero weight, are not admitted.
    pub fn new(
        point: FinalizationPoint,
        height: Height,
        generation_hash: Hash,
        config: FinalizationConfig,
        records: impl IntoIterator<Item = VoterRecord>,
    ) -> Self {
        let mut total_weight = 0u64;
        let mut voters = HashMap::new();
        for record in records {
            if record.weight == 0 {
                continue;
            }
            if point < record.registered_from || point > record.registered_to {
                continue;
            }

            total_weight += record.weight;
            voters.insert(
                record.voting_public_key,
                VoterEntry { weight: record.weight, vrf_public_key: record.vrf_public_key },
            );
        }

        Self { point, height, generation_hash, config, total_weight, voters }
    }

    /// The finalization point this context is for.
    pub fn point(&self) -> FinalizationPoint {
        self.point
    }

    /// Height of the last finalized block.
    pub fn height(&self) -> Height {
        self.height
    }

    /// Generation hash of the last finalized block.
    pub fn generation_hash(&self) -> Hash {
        self.generation_hash
    }

    /// Configuration in effect for this point.
    pub fn config(&self) -> &FinalizationConfig {
        &self.config
    }

    /// Consensus threshold.
    pub fn threshold(&self) -> u64 {
        self.config.threshold
    }

    /// Combined weight of all eligible voters.
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Look up an eligible voter by voting public key.
    pub fn lookup(&self, voting_public_key: &PublicKey) -> Option<&VoterEntry> {
        self.voters.get(voting_public_key)
    }

    /// The sortition VRF input for `step`: `generation_hash || step`.
    pub fn sortition_input(&self, step: &crate::StepIdentifier) -> Vec<u8> {
        let mut input = Vec::with_capacity(Hash::SIZE + 24);
        input.extend_from_slice(self.generation_hash.as_bytes());
        input.extend_from_slice(&step.to_bytes());
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    fn record(weight: u64, from: u64, to: u64) -> VoterRecord {
        VoterRecord {
            voting_public_key: KeyPair::generate().public_key(),
            vrf_public_key: KeyPair::generate().public_key(),
            weight,
            registered_from: FinalizationPoint(from),
            registered_to: FinalizationPoint(to),
        }
    }

    fn make_context(records: Vec<VoterRecord>) -> FinalizationContext {
        FinalizationContext::new(
            FinalizationPoint(50),
            Height(123),
            Hash::from_bytes(b"generation"),
            FinalizationConfig::new(3000, 2000),
            records,
        )
    }

    #[test]
    fn test_admits_registered_voters() {
        let records = vec![record(100, 1, 100), record(200, 50, 50)];
        let keys: Vec<_> = records.iter().map(|r| r.voting_public_key).collect();

        let context = make_context(records);

        assert_eq!(context.total_weight(), 300);
        assert_eq!(context.lookup(&keys[0]).map(|e| e.weight), Some(100));
        assert_eq!(context.lookup(&keys[1]).map(|e| e.weight), Some(200));
    }

    #[test]
    fn test_rejects_voters_outside_registration_window() {
        let records = vec![record(100, 1, 49), record(200, 51, 100), record(300, 1, 100)];
        let keys: Vec<_> = records.iter().map(|r| r.voting_public_key).collect();

        let context = make_context(records);

        assert_eq!(context.total_weight(), 300);
        assert!(context.lookup(&keys[0]).is_none());
        assert!(context.lookup(&keys[1]).is_none());
        assert!(context.lookup(&keys[2]).is_some());
    }

    #[test]
    fn test_rejects_zero_weight_voters() {
        let records = vec![record(0, 1, 100)];
        let key = records[0].voting_public_key;

        let context = make_context(records);

        assert_eq!(context.total_weight(), 0);
        assert!(context.lookup(&key).is_none());
    }

    #[test]
    fn test_sortition_input_layout() {
        let context = make_context(vec![]);
        let step = crate::StepIdentifier::new(3, 4, 5);

        let input = context.sortition_input(&step);
        assert_eq!(&input[..32], context.generation_hash().as_bytes());
        assert_eq!(&input[32..], &step.to_bytes());
    }
}
