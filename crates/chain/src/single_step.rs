//! Per-stage vote-counting state machines.
//!
//! Three variants share one surface but differ in update rule:
//!
//! - **Maximum-votes** (Propose-Chain): tracks the single claim with the
//!   largest vote weight; consensus after the first message, upgraded by
//!   strictly heavier ones.
//! - **Count-votes** (most stages): accumulates weight per target, one vote
//!   per signer; first target to reach the threshold wins and is locked.
//! - **Common-block** (Collect-Chain-Votes): finds the deepest prefix of a
//!   locally proposed chain that threshold-many voters agree on; the
//!   consensus index only ever advances.
//!
//! All variants are single-threaded; the multi-step aggregator's lock
//! provides concurrent safety.

use crate::FinalizationProof;
use keystone_types::{
    FinalizationConfig, FinalizationMessage, Hash, Height, HeightHashPair, PublicKey,
};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Which variant a [`SingleStepAggregator`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorKind {
    /// Maximum-votes (Propose-Chain).
    MaximumVotes,
    /// Count-votes (counting stages).
    CountVotes,
    /// Common-block (Collect-Chain-Votes).
    CommonBlock,
}

/// A per-stage vote counter.
#[derive(Debug)]
pub enum SingleStepAggregator {
    /// Maximum-votes variant.
    MaximumVotes(MaximumVotesAggregator),
    /// Count-votes variant.
    CountVotes(CountVotesAggregator),
    /// Common-block variant.
    CommonBlock(CommonBlockAggregator),
}

impl SingleStepAggregator {
    /// Create a maximum-votes aggregator.
    pub fn maximum_votes(config: &FinalizationConfig) -> Self {
        SingleStepAggregator::MaximumVotes(MaximumVotesAggregator {
            max_hashes_per_point: config.max_hashes_per_point,
            max_votes: 0,
            best_voting_public_key: None,
            consensus: None,
        })
    }

    /// Create a count-votes aggregator.
    pub fn count_votes(config: &FinalizationConfig) -> Self {
        SingleStepAggregator::CountVotes(CountVotesAggregator {
            threshold: config.threshold,
            vote_map: HashMap::new(),
            voting_public_keys: HashSet::new(),
            consensus: None,
        })
    }

    /// Create a common-block aggregator for the proposed chain `hashes`
    /// anchored at `height`.
    pub fn common_block(config: &FinalizationConfig, hashes: Vec<Hash>, height: Height) -> Self {
        let hash_votes = vec![0u64; hashes.len()];
        SingleStepAggregator::CommonBlock(CommonBlockAggregator {
            threshold: config.threshold,
            hashes,
            height,
            hash_votes,
            voter_indices: HashMap::new(),
            consensus: None,
            consensus_hash_index: 0,
        })
    }

    /// The variant of this aggregator.
    pub fn kind(&self) -> AggregatorKind {
        match self {
            SingleStepAggregator::MaximumVotes(_) => AggregatorKind::MaximumVotes,
            SingleStepAggregator::CountVotes(_) => AggregatorKind::CountVotes,
            SingleStepAggregator::CommonBlock(_) => AggregatorKind::CommonBlock,
        }
    }

    /// Incorporate one validated vote carrying `num_votes` weight.
    pub fn add(&mut self, message: &FinalizationMessage, num_votes: u64) {
        if !self.check_hashes_count(message.hashes.len()) {
            debug!(
                step = %message.step,
                hashes_count = message.hashes.len(),
                "skipping message with unexpected number of hashes"
            );
            return;
        }

        // the voting target is always the first hash; maximum-votes keeps the
        // remaining hashes in the retained message as the proposed extension
        let target = HeightHashPair::new(message.height, message.hashes[0]);
        let signer = message.signer();
        match self {
            SingleStepAggregator::MaximumVotes(aggregator) => {
                aggregator.add(signer, target, num_votes)
            }
            SingleStepAggregator::CountVotes(aggregator) => {
                aggregator.add(signer, target, num_votes)
            }
            SingleStepAggregator::CommonBlock(aggregator) => {
                aggregator.add(signer, target, num_votes)
            }
        }
    }

    /// Whether the stage threshold has been crossed.
    pub fn has_consensus(&self) -> bool {
        self.consensus().is_some()
    }

    /// The agreed block, when consensus has been reached.
    pub fn consensus(&self) -> Option<HeightHashPair> {
        match self {
            SingleStepAggregator::MaximumVotes(aggregator) => aggregator.consensus,
            SingleStepAggregator::CountVotes(aggregator) => aggregator.consensus,
            SingleStepAggregator::CommonBlock(aggregator) => aggregator.consensus,
        }
    }

    /// Shrink `proof` to the minimum message set attesting the consensus.
    /// Identity for all variants except maximum-votes, which keeps exactly
    /// the best voter's message.
    pub fn reduce(&self, proof: &mut FinalizationProof) {
        if let SingleStepAggregator::MaximumVotes(aggregator) = self {
            aggregator.reduce(proof);
        }
    }

    fn check_hashes_count(&self, count: usize) -> bool {
        if count == 0 {
            return false;
        }
        match self {
            SingleStepAggregator::MaximumVotes(aggregator) => {
                count <= aggregator.max_hashes_per_point as usize
            }
            _ => count == 1,
        }
    }
}

/// Tracks the voter whose claim carries the largest vote weight.
#[derive(Debug)]
pub struct MaximumVotesAggregator {
    max_hashes_per_point: u32,
    max_votes: u64,
    best_voting_public_key: Option<PublicKey>,
    consensus: Option<HeightHashPair>,
}

impl MaximumVotesAggregator {
    fn add(&mut self, signer: PublicKey, target: HeightHashPair, num_votes: u64) {
        // first claim with strictly more votes wins; ties keep the incumbent
        if num_votes <= self.max_votes {
            return;
        }

        self.max_votes = num_votes;
        self.best_voting_public_key = Some(signer);
        self.consensus = Some(target);
    }

    fn reduce(&self, proof: &mut FinalizationProof) {
        let best = self
            .best_voting_public_key
            .and_then(|key| proof.iter().find(|message| message.signer() == key).cloned());

        proof.clear();
        if let Some(message) = best {
            proof.push(message);
        }
    }
}

/// Accumulates weight per target until one reaches the threshold.
#[derive(Debug)]
pub struct CountVotesAggregator {
    threshold: u64,
    vote_map: HashMap<HeightHashPair, u64>,
    voting_public_keys: HashSet<PublicKey>,
    consensus: Option<HeightHashPair>,
}

impl CountVotesAggregator {
    fn add(&mut self, signer: PublicKey, target: HeightHashPair, num_votes: u64) {
        // one vote per voter per step; the first target past the threshold is
        // locked for the lifetime of the step
        if self.consensus.is_some() || !self.voting_public_keys.insert(signer) {
            return;
        }

        let weight = self.vote_map.entry(target).or_insert(0);
        *weight += num_votes;

        if *weight >= self.threshold {
            self.consensus = Some(target);
        }
    }

    #[cfg(test)]
    fn weight(&self, target: &HeightHashPair) -> u64 {
        self.vote_map.get(target).copied().unwrap_or(0)
    }
}

/// Finds the deepest block of a proposed chain that threshold-many voters
/// agree on.
#[derive(Debug)]
pub struct CommonBlockAggregator {
    threshold: u64,
    hashes: Vec<Hash>,
    height: Height,
    hash_votes: Vec<u64>,
    /// Highest chain index each signer has voted for. `None` marks a signer
    /// whose first vote targeted a hash off the proposed chain; such signers
    /// stay ignored.
    voter_indices: HashMap<PublicKey, Option<usize>>,
    consensus: Option<HeightHashPair>,
    consensus_hash_index: usize,
}

impl CommonBlockAggregator {
    fn add(&mut self, signer: PublicKey, target: HeightHashPair, num_votes: u64) {
        let hash_index = self.find_index(&target);

        let first_index_to_increment = match self.voter_indices.entry(signer) {
            Entry::Vacant(entry) => {
                entry.insert(hash_index);
                0
            }
            Entry::Occupied(mut entry) => {
                let Some(hash_index) = hash_index else {
                    return;
                };
                match *entry.get() {
                    None => return,
                    Some(previous) if hash_index <= previous => return,
                    // only credit indices not previously credited
                    Some(previous) => {
                        entry.insert(Some(hash_index));
                        previous + 1
                    }
                }
            }
        };

        let Some(hash_index) = hash_index else {
            return;
        };
        self.increment_votes(first_index_to_increment, hash_index, num_votes);
    }

    fn find_index(&self, target: &HeightHashPair) -> Option<usize> {
        let index = self.hashes.iter().position(|hash| *hash == target.hash)?;
        (self.height.0 + index as u64 == target.height.0).then_some(index)
    }

    fn increment_votes(&mut self, start_index: usize, end_index: usize, num_votes: u64) {
        // once consensus exists, only allow new consensus that covers more of
        // the chain
        let adjusted_start =
            if self.consensus.is_some() { self.consensus_hash_index + 1 } else { start_index };

        for hash_index in (adjusted_start..=end_index).rev() {
            self.hash_votes[hash_index] += num_votes;
            if self.hash_votes[hash_index] >= self.threshold {
                self.consensus = Some(HeightHashPair::new(
                    Height(self.height.0 + hash_index as u64),
                    self.hashes[hash_index],
                ));
                self.consensus_hash_index = hash_index;
                return;
            }
        }
    }
}
