//! Vote aggregation and the finalization round state machine.
//!
//! This crate contains the finalization core:
//!
//! - [`process_message`]: validates an incoming vote against a
//!   [`FinalizationContext`](keystone_types::FinalizationContext) and derives
//!   its sortition vote weight.
//! - [`SingleStepAggregator`]: the three per-stage vote counters
//!   (maximum-votes, count-votes, common-block).
//! - [`MultiStepAggregator`]: the thread-safe cache of per-step aggregators
//!   for the current finalization point, with a reader/writer view split.
//! - [`Orchestrator`]: the sub-round state machine that selects the right
//!   aggregator per stage and advances on consensus or timeout.
//!
//! The aggregators are synchronous; all concurrency is confined to the
//! multi-step aggregator's lock. Collaborators (message processor, aggregator
//! factory, consensus sink) are injected as boxed closures so the wiring
//! stays at the node layer.

mod multi_step;
mod orchestrator;
mod processor;
mod single_step;

pub use multi_step::{AggregatorError, AggregatorModifier, AggregatorView, MultiStepAggregator};
pub use orchestrator::{
    HeightHashesPair, HeightHashesPairSupplier, MessageSink, Orchestrator, Stage,
};
pub use processor::{derive_vote_count, prepare_message, process_message, ProcessMessageResult};
pub use single_step::{
    AggregatorKind, CommonBlockAggregator, CountVotesAggregator, MaximumVotesAggregator,
    SingleStepAggregator,
};

use keystone_types::{FinalizationMessage, HeightHashPair, StepIdentifier};
use std::sync::Arc;

/// Ordered list of messages that jointly attest a step's consensus.
///
/// Messages are shared: the network broadcast path and the aggregator may
/// both hold references, and either may hold the last one.
pub type FinalizationProof = Vec<Arc<FinalizationMessage>>;

/// Failure of the processor's environment (context construction from
/// storage), as opposed to a message being rejected. Propagates out of
/// [`AggregatorModifier::add`]; it indicates local corruption, not remote
/// misbehavior.
pub type ProcessorError = Box<dyn std::error::Error + Send + Sync>;

/// Validates a message and returns the processing result together with the
/// message's vote weight.
pub type MessageProcessor = Box<
    dyn Fn(&FinalizationMessage) -> Result<(ProcessMessageResult, u64), ProcessorError>
        + Send
        + Sync,
>;

/// Creates a single-step aggregator for a step identifier.
pub type SingleStepAggregatorFactory =
    Box<dyn Fn(&StepIdentifier) -> SingleStepAggregator + Send + Sync>;

/// Called when a step reaches consensus, with the step, the agreed block and
/// the (already reduced) proof.
pub type ConsensusSink =
    Box<dyn Fn(&StepIdentifier, &HeightHashPair, &FinalizationProof) + Send + Sync>;
