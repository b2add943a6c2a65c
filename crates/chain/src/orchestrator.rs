//! Stage-driven state machine for one finalization round.
//!
//! A round walks five sub-rounds: Propose-Chain, Collect-Chain-Votes,
//! Count-Best-Hash-Votes, BinaryBA-Start and BinaryBA-End. The orchestrator
//! picks the aggregator variant per sub-round, reacts to per-step consensus
//! (via the sink it wraps around the point-consensus sink), and falls back
//! to timeouts when a stage stalls. Time is supplied by the caller through
//! periodic [`Orchestrator::advance`] calls.

use crate::{ConsensusSink, SingleStepAggregator, SingleStepAggregatorFactory};
use keystone_types::{FinalizationConfig, FinalizationMessage, Hash, Height};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A locally proposed chain: hashes starting at `height`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeightHashesPair {
    /// Height of the first hash.
    pub height: Height,
    /// Hashes starting at `height`.
    pub hashes: Vec<Hash>,
}

impl HeightHashesPair {
    /// The placeholder proposal emitted on timeout when there is nothing to
    /// vote for.
    pub fn empty() -> Self {
        Self { height: Height(0), hashes: vec![Hash::ZERO] }
    }
}

/// Supplies the current local chain proposal from block storage.
pub type HeightHashesPairSupplier = Arc<dyn Fn() -> HeightHashesPair + Send + Sync>;

/// Builds and broadcasts a vote message for the supplied pair.
pub type MessageSink = Arc<dyn Fn(&HeightHashesPair) + Send + Sync>;

/// The sub-rounds of a finalization round, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Voters announce chain proposals; the heaviest claim wins.
    ProposeChain = 0,
    /// Voters agree on the deepest common block of the proposed chain.
    CollectChainVotes = 1,
    /// Voters count votes for the best hash.
    CountBestHashVotes = 2,
    /// Binary agreement, first half.
    BinaryBaStart = 3,
    /// Binary agreement, second half; consensus here finalizes the point.
    BinaryBaEnd = 4,
}

impl Stage {
    fn next(self) -> Stage {
        match self {
            Stage::ProposeChain => Stage::CollectChainVotes,
            Stage::CollectChainVotes => Stage::CountBestHashVotes,
            Stage::CountBestHashVotes => Stage::BinaryBaStart,
            Stage::BinaryBaStart => Stage::BinaryBaEnd,
            Stage::BinaryBaEnd => Stage::ProposeChain,
        }
    }
}

struct OrchestratorState {
    stage: Stage,
    stage_start_time: Option<Duration>,
    last_propose_message: Option<Arc<FinalizationMessage>>,
}

/// Orchestrates the finalization round.
pub struct Orchestrator {
    config: FinalizationConfig,
    height_hashes_pair_supplier: HeightHashesPairSupplier,
    message_sink: MessageSink,
    state: Mutex<OrchestratorState>,
}

impl Orchestrator {
    /// Create an orchestrator around its collaborators.
    pub fn new(
        config: FinalizationConfig,
        height_hashes_pair_supplier: HeightHashesPairSupplier,
        message_sink: MessageSink,
    ) -> Self {
        Self {
            config,
            height_hashes_pair_supplier,
            message_sink,
            state: Mutex::new(OrchestratorState {
                stage: Stage::ProposeChain,
                stage_start_time: None,
                last_propose_message: None,
            }),
        }
    }

    /// The current sub-round index.
    pub fn sub_round(&self) -> u64 {
        self.state.lock().stage as u64
    }

    /// When the current sub-round started, if it has.
    pub fn sub_round_start_time(&self) -> Option<Duration> {
        self.state.lock().stage_start_time
    }

    /// Create the factory that maps a step's sub-round to the aggregator
    /// variant handling it. For Collect-Chain-Votes the local chain proposal
    /// is fetched at factory-invocation time.
    pub fn create_aggregator_factory(orchestrator: &Arc<Orchestrator>) -> SingleStepAggregatorFactory {
        let orchestrator = Arc::clone(orchestrator);
        Box::new(move |step_identifier| {
            debug!(step = %step_identifier, "creating single step aggregator");
            match step_identifier.sub_round {
                0 => SingleStepAggregator::maximum_votes(&orchestrator.config),
                1 => {
                    let pair = (orchestrator.height_hashes_pair_supplier)();
                    SingleStepAggregator::common_block(
                        &orchestrator.config,
                        pair.hashes,
                        pair.height,
                    )
                }
                _ => SingleStepAggregator::count_votes(&orchestrator.config),
            }
        })
    }

    /// Wrap `point_consensus_sink` into the per-step consensus sink handed to
    /// the multi-step aggregator.
    ///
    /// Propose-Chain consensus retains the best proposal without advancing
    /// (a heavier claim may still arrive); BinaryBA-End consensus is the true
    /// finalization event and is delegated before wrapping back to
    /// Propose-Chain; the stages in between simply advance.
    pub fn create_consensus_sink(
        orchestrator: &Arc<Orchestrator>,
        point_consensus_sink: ConsensusSink,
    ) -> ConsensusSink {
        let orchestrator = Arc::clone(orchestrator);
        Box::new(move |step_identifier, height_hash_pair, proof| {
            match step_identifier.sub_round {
                0 => {
                    // save the last (best) proposal message, but don't
                    // increment the stage
                    orchestrator.state.lock().last_propose_message = proof.first().cloned();
                    return;
                }
                4 => point_consensus_sink(step_identifier, height_hash_pair, proof),
                _ => {}
            }

            orchestrator.increment_stage();
        })
    }

    /// Prepare and broadcast a proposal message for the current local chain.
    pub fn propose(&self) {
        (self.message_sink)(&(self.height_hashes_pair_supplier)());
    }

    /// Run the orchestrator at `now`.
    ///
    /// The first call of a stage records its start time. Later calls time the
    /// stage out: Propose-Chain consumes the retained best proposal (or emits
    /// an empty one) and advances; every other stage emits an empty proposal
    /// and advances.
    pub fn advance(&self, now: Duration) {
        let mut state = self.state.lock();
        let Some(start_time) = state.stage_start_time else {
            state.stage_start_time = Some(now);
            return;
        };

        if state.stage == Stage::ProposeChain {
            if now.saturating_sub(start_time) > self.config.propose_message_stage_duration {
                match state.last_propose_message.take() {
                    Some(message) => self.emit_follow_up_vote(&message),
                    None => (self.message_sink)(&HeightHashesPair::empty()),
                }
                Self::increment_stage_locked(&mut state);
            }
            return;
        }

        if now.saturating_sub(start_time) > self.config.aggregation_stage_max_duration {
            (self.message_sink)(&HeightHashesPair::empty());
            Self::increment_stage_locked(&mut state);
        }
    }

    /// Vote for the anchor of the retained best proposal.
    fn emit_follow_up_vote(&self, message: &FinalizationMessage) {
        let Some(anchor) = message.hashes.first() else {
            // a proposal without hashes never wins maximum-votes; treat a
            // malformed retained message like a missing one
            (self.message_sink)(&HeightHashesPair::empty());
            return;
        };
        (self.message_sink)(&HeightHashesPair { height: message.height, hashes: vec![*anchor] });
    }

    fn increment_stage(&self) {
        Self::increment_stage_locked(&mut self.state.lock());
    }

    fn increment_stage_locked(state: &mut OrchestratorState) {
        state.stage_start_time = None;
        state.stage = state.stage.next();
        debug!(stage = ?state.stage, "advanced finalization stage");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AggregatorKind, FinalizationProof};
    use keystone_types::{
        HeightHashPair, KeyPair, Signature, StepIdentifier, VoteSignature, VrfProof,
    };
    use tracing_test::traced_test;

    fn config() -> FinalizationConfig {
        FinalizationConfig::new(3000, 2000)
            .with_propose_message_stage_duration(Duration::from_secs(10))
            .with_aggregation_stage_max_duration(Duration::from_secs(20))
    }

    struct TestHarness {
        orchestrator: Arc<Orchestrator>,
        supplied_pair: HeightHashesPair,
        sunk_pairs: Arc<Mutex<Vec<HeightHashesPair>>>,
    }

    fn make_harness() -> TestHarness {
        let supplied_pair = HeightHashesPair {
            height: Height(101),
            hashes: vec![
                Hash::from_bytes(b"h0"),
                Hash::from_bytes(b"h1"),
                Hash::from_bytes(b"h2"),
            ],
        };
        let sunk_pairs = Arc::new(Mutex::new(Vec::new()));

        let supplier_pair = supplied_pair.clone();
        let sink_pairs = Arc::clone(&sunk_pairs);
        let orchestrator = Arc::new(Orchestrator::new(
            config(),
            Arc::new(move || supplier_pair.clone()),
            Arc::new(move |pair: &HeightHashesPair| sink_pairs.lock().push(pair.clone())),
        ));

        TestHarness { orchestrator, supplied_pair, sunk_pairs }
    }

    fn make_message(step: StepIdentifier, height: u64, hashes: Vec<Hash>) -> FinalizationMessage {
        FinalizationMessage {
            step,
            height: Height(height),
            signature: VoteSignature {
                voting_public_key: KeyPair::generate().public_key(),
                signature: Signature::zero(),
            },
            sortition_proof: VrfProof::zero(),
            hashes,
        }
    }

    #[test]
    fn test_initial_state() {
        let harness = make_harness();

        assert_eq!(harness.orchestrator.sub_round(), 0);
        assert_eq!(harness.orchestrator.sub_round_start_time(), None);
    }

    #[test]
    fn test_factory_maps_sub_rounds_to_variants() {
        let harness = make_harness();
        let factory = Orchestrator::create_aggregator_factory(&harness.orchestrator);

        let kinds: Vec<_> = (0..6)
            .map(|sub_round| factory(&StepIdentifier::new(7, 1, sub_round)).kind())
            .collect();

        assert_eq!(
            kinds,
            vec![
                AggregatorKind::MaximumVotes,
                AggregatorKind::CommonBlock,
                AggregatorKind::CountVotes,
                AggregatorKind::CountVotes,
                AggregatorKind::CountVotes,
                AggregatorKind::CountVotes,
            ]
        );
    }

    #[test]
    fn test_factory_seeds_common_block_with_local_proposal() {
        let harness = make_harness();
        let factory = Orchestrator::create_aggregator_factory(&harness.orchestrator);

        let mut aggregator = factory(&StepIdentifier::new(7, 1, 1));

        // a vote for the deepest proposed hash reaches consensus only at the
        // supplied chain's heights, proving the proposal was wired through
        let vote =
            make_message(StepIdentifier::new(7, 1, 1), 103, vec![harness.supplied_pair.hashes[2]]);
        aggregator.add(&vote, 2000);
        assert_eq!(
            aggregator.consensus(),
            Some(HeightHashPair::new(Height(103), harness.supplied_pair.hashes[2]))
        );
    }

    #[test]
    fn test_propose_prepares_proposal_message() {
        let harness = make_harness();

        harness.orchestrator.propose();

        assert_eq!(harness.sunk_pairs.lock().clone(), vec![harness.supplied_pair.clone()]);
    }

    #[traced_test]
    #[test]
    fn test_advance_records_stage_start_time() {
        let harness = make_harness();

        harness.orchestrator.advance(Duration::from_secs(5));

        assert_eq!(harness.orchestrator.sub_round_start_time(), Some(Duration::from_secs(5)));
        assert_eq!(harness.orchestrator.sub_round(), 0);
        assert!(harness.sunk_pairs.lock().is_empty());
    }

    #[traced_test]
    #[test]
    fn test_advance_before_timeout_does_nothing() {
        let harness = make_harness();
        harness.orchestrator.advance(Duration::from_secs(5));

        harness.orchestrator.advance(Duration::from_secs(15));

        assert_eq!(harness.orchestrator.sub_round(), 0);
        assert!(harness.sunk_pairs.lock().is_empty());
    }

    #[traced_test]
    #[test]
    fn test_propose_chain_timeout_without_proposal_emits_empty() {
        let harness = make_harness();
        harness.orchestrator.advance(Duration::from_secs(5));

        harness.orchestrator.advance(Duration::from_secs(16));

        assert_eq!(harness.sunk_pairs.lock().clone(), vec![HeightHashesPair::empty()]);
        assert_eq!(harness.orchestrator.sub_round(), 1);
        assert_eq!(harness.orchestrator.sub_round_start_time(), None);
    }

    #[traced_test]
    #[test]
    fn test_propose_chain_timeout_consumes_retained_proposal() {
        let harness = make_harness();
        let sink = Orchestrator::create_consensus_sink(&harness.orchestrator, Box::new(|_, _, _| {}));

        // propose-chain consensus retains the best proposal without advancing
        let proposal = Arc::new(make_message(
            StepIdentifier::new(7, 1, 0),
            101,
            vec![Hash::from_bytes(b"anchor"), Hash::from_bytes(b"ext")],
        ));
        let proof: FinalizationProof = vec![Arc::clone(&proposal)];
        sink(
            &StepIdentifier::new(7, 1, 0),
            &HeightHashPair::new(Height(101), proposal.hashes[0]),
            &proof,
        );
        assert_eq!(harness.orchestrator.sub_round(), 0);

        harness.orchestrator.advance(Duration::from_secs(5));
        harness.orchestrator.advance(Duration::from_secs(16));

        // the follow-up vote targets the retained proposal's anchor
        assert_eq!(
            harness.sunk_pairs.lock().clone(),
            vec![HeightHashesPair {
                height: Height(101),
                hashes: vec![Hash::from_bytes(b"anchor")],
            }]
        );
        assert_eq!(harness.orchestrator.sub_round(), 1);

        // the proposal was consumed; the next timeout falls back to empty
        harness.orchestrator.advance(Duration::from_secs(20));
        harness.orchestrator.advance(Duration::from_secs(41));
        assert_eq!(harness.orchestrator.sub_round(), 2);
        assert_eq!(harness.sunk_pairs.lock().last().cloned(), Some(HeightHashesPair::empty()));
    }

    #[traced_test]
    #[test]
    fn test_aggregation_stage_timeout_emits_empty_and_advances() {
        let harness = make_harness();
        harness.orchestrator.increment_stage();
        assert_eq!(harness.orchestrator.sub_round(), 1);

        harness.orchestrator.advance(Duration::from_secs(5));
        harness.orchestrator.advance(Duration::from_secs(25));
        assert_eq!(harness.orchestrator.sub_round(), 1, "within timeout");

        harness.orchestrator.advance(Duration::from_secs(26));
        assert_eq!(harness.orchestrator.sub_round(), 2);
        assert_eq!(harness.sunk_pairs.lock().clone(), vec![HeightHashesPair::empty()]);
    }

    #[traced_test]
    #[test]
    fn test_consensus_sink_advances_intermediate_stages() {
        let harness = make_harness();
        let finalized = Arc::new(Mutex::new(Vec::new()));
        let sink_finalized = Arc::clone(&finalized);
        let sink = Orchestrator::create_consensus_sink(&harness.orchestrator, Box::new(move |step, pair, _| {
            sink_finalized.lock().push((*step, *pair));
        }));

        for sub_round in 1..4 {
            let step = StepIdentifier::new(7, 1, sub_round);
            sink(&step, &HeightHashPair::new(Height(101), Hash::from_bytes(b"h")), &vec![]);
            assert_eq!(harness.orchestrator.sub_round(), sub_round + 1);
        }
        assert!(finalized.lock().is_empty(), "intermediate stages are not finalization events");
    }

    #[traced_test]
    #[test]
    fn test_consensus_sink_delegates_binary_ba_end_and_wraps() {
        let harness = make_harness();
        let finalized = Arc::new(Mutex::new(Vec::new()));
        let sink_finalized = Arc::clone(&finalized);
        let sink = Orchestrator::create_consensus_sink(&harness.orchestrator, Box::new(move |step, pair, _| {
            sink_finalized.lock().push((*step, *pair));
        }));

        // walk to BinaryBA-End
        for _ in 0..4 {
            harness.orchestrator.increment_stage();
        }
        assert_eq!(harness.orchestrator.sub_round(), 4);

        let step = StepIdentifier::new(7, 1, 4);
        let pair = HeightHashPair::new(Height(103), Hash::from_bytes(b"final"));
        sink(&step, &pair, &vec![]);

        assert_eq!(finalized.lock().clone(), vec![(step, pair)]);
        assert_eq!(harness.orchestrator.sub_round(), 0, "wraps back to propose-chain");
    }

    #[traced_test]
    #[test]
    fn test_stage_start_time_resets_on_advance() {
        let harness = make_harness();
        harness.orchestrator.advance(Duration::from_secs(5));
        harness.orchestrator.advance(Duration::from_secs(16));

        // the next stage picks up a fresh start time on its first advance
        assert_eq!(harness.orchestrator.sub_round_start_time(), None);
        harness.orchestrator.advance(Duration::from_secs(17));
        assert_eq!(harness.orchestrator.sub_round_start_time(), Some(Duration::from_secs(17)));
    }
}
