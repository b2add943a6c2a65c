//! Thread-safe cache of per-step aggregators for the current finalization
//! point.
//!
//! The aggregator exposes a read view ([`AggregatorView`]) for gossip
//! queries and counters, and an exclusive modifier ([`AggregatorModifier`])
//! for message ingestion. Both are RAII handles over a reader/writer lock;
//! dropping the handle releases the lock.
//!
//! Acceptance policy: a message is only considered when its step belongs to
//! the next finalization point and is not below the minimum tracked step.
//! When a step reaches consensus its proof is reduced, the consensus sink is
//! invoked under the writer lock, and every step strictly below the
//! consensus step is pruned. Sinks therefore observe consensus events in
//! exactly the order they occurred.

use crate::{
    ConsensusSink, FinalizationProof, MessageProcessor, ProcessMessageResult, ProcessorError,
    SingleStepAggregator, SingleStepAggregatorFactory,
};
use keystone_types::{FinalizationMessage, FinalizationPoint, ShortHash, StepIdentifier};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors surfaced by the modifier. Anything a remote peer could cause is
/// dropped instead; these indicate local programming errors or corruption.
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// Attempted to move the next finalization point backwards.
    #[error("cannot set next finalization point below {current}")]
    DecreasingFinalizationPoint {
        /// The currently configured next finalization point.
        current: FinalizationPoint,
    },
    /// The message processor's environment failed.
    #[error("message processor failed")]
    ProcessorFailure(#[source] ProcessorError),
}

/// Per-step aggregation state: the owning single-step aggregator and the
/// accumulated proof.
struct StepData {
    aggregator: SingleStepAggregator,
    proof: FinalizationProof,
}

struct AggregatorState {
    max_response_size: u64,
    message_processor: MessageProcessor,
    aggregator_factory: SingleStepAggregatorFactory,
    consensus_sink: ConsensusSink,

    min_step_identifier: StepIdentifier,
    next_finalization_point: FinalizationPoint,
    steps: BTreeMap<StepIdentifier, StepData>,
}

/// Aggregates finalization messages across multiple steps until consensus is
/// reached.
pub struct MultiStepAggregator {
    state: RwLock<AggregatorState>,
}

impl MultiStepAggregator {
    /// Create an aggregator with its injected collaborators.
    pub fn new(
        max_response_size: u64,
        message_processor: MessageProcessor,
        aggregator_factory: SingleStepAggregatorFactory,
        consensus_sink: ConsensusSink,
    ) -> Self {
        Self {
            state: RwLock::new(AggregatorState {
                max_response_size,
                message_processor,
                aggregator_factory,
                consensus_sink,
                min_step_identifier: StepIdentifier::default(),
                next_finalization_point: FinalizationPoint::default(),
                steps: BTreeMap::new(),
            }),
        }
    }

    /// Acquire a read-only view. Blocks writers for the lifetime of the
    /// returned handle.
    pub fn view(&self) -> AggregatorView<'_> {
        AggregatorView { state: self.state.read() }
    }

    /// Acquire the exclusive modifier. Blocks all other access for the
    /// lifetime of the returned handle.
    pub fn modifier(&self) -> AggregatorModifier<'_> {
        AggregatorModifier { state: self.state.write() }
    }
}

/// Read-only view of the multi-step aggregator.
pub struct AggregatorView<'a> {
    state: RwLockReadGuard<'a, AggregatorState>,
}

impl AggregatorView<'_> {
    /// Number of step identifiers currently tracked.
    pub fn size(&self) -> usize {
        self.state.steps.len()
    }

    /// The acceptance floor: the minimum step identifier currently tracked.
    pub fn min_step_identifier(&self) -> StepIdentifier {
        self.state.min_step_identifier
    }

    /// Short hashes of every retained message, in step order.
    pub fn short_hashes(&self) -> Vec<ShortHash> {
        self.state
            .steps
            .values()
            .flat_map(|data| data.proof.iter().map(|message| message.content_hash().short()))
            .collect()
    }

    /// Messages from steps at or above `step_identifier` whose short hash is
    /// not in `known_short_hashes`, in step order, truncated so the total
    /// serialized size stays within the response cap.
    pub fn unknown_messages(
        &self,
        step_identifier: StepIdentifier,
        known_short_hashes: &HashSet<ShortHash>,
    ) -> Vec<Arc<FinalizationMessage>> {
        let mut total_size = 0u64;
        let mut messages = Vec::new();
        for data in self.state.steps.range(step_identifier..).map(|(_, data)| data) {
            for message in &data.proof {
                if known_short_hashes.contains(&message.content_hash().short()) {
                    continue;
                }

                total_size += message.serialized_size() as u64;
                if total_size > self.state.max_response_size {
                    return messages;
                }
                messages.push(Arc::clone(message));
            }
        }

        messages
    }
}

/// Exclusive write handle of the multi-step aggregator.
pub struct AggregatorModifier<'a> {
    state: RwLockWriteGuard<'a, AggregatorState>,
}

impl AggregatorModifier<'_> {
    /// Set the next finalization point. Only messages with a matching point
    /// are accepted afterwards; all tracked steps are dropped when the point
    /// actually changes.
    pub fn set_next_finalization_point(
        &mut self,
        point: FinalizationPoint,
    ) -> Result<(), AggregatorError> {
        if point < self.state.next_finalization_point {
            return Err(AggregatorError::DecreasingFinalizationPoint {
                current: self.state.next_finalization_point,
            });
        }
        if point == self.state.next_finalization_point {
            return Ok(());
        }

        self.state.min_step_identifier = StepIdentifier::new(point.0, 0, 0);
        self.state.next_finalization_point = point;
        self.state.steps.clear();
        Ok(())
    }

    /// Add a finalization message.
    ///
    /// The message is shared because it is detached from a network range and
    /// kept alive with its associated step. Messages a remote peer could
    /// have malformed are silently dropped; the only error is a processor
    /// environment failure, which indicates local corruption.
    pub fn add(&mut self, message: Arc<FinalizationMessage>) -> Result<(), AggregatorError> {
        let step = message.step;
        if !self.can_accept(&step) {
            debug!(step = %step, "ignoring message outside accepted step range");
            return Ok(());
        }

        let (result, num_votes) = (self.state.message_processor)(&message)
            .map_err(AggregatorError::ProcessorFailure)?;
        if result != ProcessMessageResult::Success {
            warn!(step = %step, result = ?result, "rejecting finalization message");
            return Ok(());
        }

        let state = &mut *self.state;
        let data = state.steps.entry(step).or_insert_with(|| {
            debug!(step = %step, "creating single step aggregator");
            StepData { aggregator: (state.aggregator_factory)(&step), proof: Vec::new() }
        });

        data.proof.push(Arc::clone(&message));
        data.aggregator.add(&message, num_votes);

        let Some(consensus) = data.aggregator.consensus() else {
            return Ok(());
        };

        // the sink observes the reduced proof; the reduction also shrinks
        // what the gossip views serve for this step
        data.aggregator.reduce(&mut data.proof);
        info!(step = %step, %consensus, "consensus reached");
        (state.consensus_sink)(&step, &consensus, &data.proof);

        // new consensus was reached, so drop older steps
        state.min_step_identifier = step;
        let retained = state.steps.split_off(&step);
        state.steps = retained;
        Ok(())
    }

    fn can_accept(&self, step_identifier: &StepIdentifier) -> bool {
        // only accept messages for the current point that are no less than
        // the minimum consensus step
        self.state.next_finalization_point == step_identifier.finalization_point()
            && *step_identifier >= self.state.min_step_identifier
    }
}
