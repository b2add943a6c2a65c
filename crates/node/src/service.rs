//! Assembly of the finalization core and its node-facing handlers.

use crate::{
    metrics, AccountStateView, ContextFactory, FinalizationSubscriber, MessageBroadcaster,
    RecentHashCache, TimeSupplier,
};
use keystone_chain::{
    process_message, AggregatorError, ConsensusSink, HeightHashesPairSupplier, MessageProcessor,
    MessageSink, MultiStepAggregator, Orchestrator,
};
use keystone_messages::{PullMessagesRequest, PullMessagesResponse};
use keystone_storage::{BlockStorageView, ProofStorage, StorageError};
use keystone_types::{FinalizationConfig, FinalizationMessage, ShortHash};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

/// Failures of the service's own operations. Remote-origin problems never
/// surface here; both variants indicate local corruption or misuse.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage read or write failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Aggregator misuse or processor environment failure.
    #[error(transparent)]
    Aggregator(#[from] AggregatorError),
}

/// The assembled finalization subsystem of one node.
///
/// Owns the multi-step aggregator and the orchestrator, and wires them
/// together: the orchestrator supplies the aggregator factory and the
/// consensus sink; the point-consensus sink persists the proof and notifies
/// the subscriber.
pub struct FinalizationService {
    aggregator: Arc<MultiStepAggregator>,
    orchestrator: Arc<Orchestrator>,
    proof_storage: Arc<dyn ProofStorage>,
    broadcaster: Arc<dyn MessageBroadcaster>,
    recent_hashes: Mutex<RecentHashCache>,
    time_supplier: TimeSupplier,
}

impl FinalizationService {
    /// Wire the subsystem out of its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: FinalizationConfig,
        proof_storage: Arc<dyn ProofStorage>,
        block_storage: Arc<dyn BlockStorageView>,
        account_state: Arc<dyn AccountStateView>,
        subscriber: Arc<dyn FinalizationSubscriber>,
        broadcaster: Arc<dyn MessageBroadcaster>,
        height_hashes_pair_supplier: HeightHashesPairSupplier,
        message_sink: MessageSink,
        time_supplier: TimeSupplier,
    ) -> Result<Self, ServiceError> {
        let orchestrator = Arc::new(Orchestrator::new(
            config.clone(),
            height_hashes_pair_supplier,
            message_sink,
        ));

        let context_factory = ContextFactory::new(
            config.clone(),
            Arc::clone(&proof_storage),
            block_storage,
            account_state,
        );
        let message_processor: MessageProcessor = Box::new(move |message| {
            let context = context_factory.build()?;
            Ok(process_message(message, &context))
        });

        let point_consensus_sink: ConsensusSink = {
            let proof_storage = Arc::clone(&proof_storage);
            Box::new(move |step_identifier, height_hash_pair, proof| {
                info!(step = %step_identifier, consensus = %height_hash_pair, "point finalized");
                if let Err(storage_error) = proof_storage.save_proof(height_hash_pair, proof) {
                    // durability failed; do not announce a proof that is not
                    // on disk
                    error!(error = %storage_error, "failed to persist finalization proof");
                    return;
                }
                subscriber.notify_finalized_block(
                    height_hash_pair.height,
                    height_hash_pair.hash,
                    step_identifier.finalization_point(),
                );
            })
        };

        let aggregator = Arc::new(MultiStepAggregator::new(
            config.message_synchronization_max_response_size,
            message_processor,
            Orchestrator::create_aggregator_factory(&orchestrator),
            Orchestrator::create_consensus_sink(&orchestrator, point_consensus_sink),
        ));
        aggregator
            .modifier()
            .set_next_finalization_point(proof_storage.finalization_point()?.next())?;

        Ok(Self {
            aggregator,
            orchestrator,
            proof_storage,
            broadcaster,
            recent_hashes: Mutex::new(RecentHashCache::new(
                config.short_lived_cache_message_duration,
            )),
            time_supplier,
        })
    }

    /// Consume a batch of messages received from the network.
    ///
    /// Messages for a different finalization point are ignored, duplicates
    /// within the dedup window are dropped, and the survivors are fed to the
    /// aggregator and fanned out to peers.
    pub fn process_message_range(
        &self,
        messages: Vec<FinalizationMessage>,
    ) -> Result<(), ServiceError> {
        let current_point = self.aggregator.view().min_step_identifier().point;

        let mut new_messages = Vec::new();
        for message in messages {
            if message.step.point != current_point {
                debug!(step = %message.step, "ignoring message for different finalization point");
                continue;
            }
            if !self.recent_hashes.lock().add((self.time_supplier)(), message.content_hash()) {
                continue;
            }

            let message = Arc::new(message);
            self.aggregator.modifier().add(Arc::clone(&message))?;
            new_messages.push(message);
        }

        if !new_messages.is_empty() {
            self.broadcaster.broadcast(&new_messages);
        }
        Ok(())
    }

    /// Answer a pull-messages request from a peer.
    pub fn pull_messages(&self, request: &PullMessagesRequest) -> PullMessagesResponse {
        let known_short_hashes: HashSet<ShortHash> =
            request.known_short_hashes.iter().copied().collect();
        let messages = self
            .aggregator
            .view()
            .unknown_messages(request.step_identifier, &known_short_hashes);

        PullMessagesResponse {
            messages: messages.into_iter().map(|message| (*message).clone()).collect(),
        }
    }

    /// Short hashes of every message the aggregator retains.
    pub fn short_hashes(&self) -> Vec<ShortHash> {
        self.aggregator.view().short_hashes()
    }

    /// Move the aggregator to the point following the last finalized one.
    /// No-op when already there; called periodically by the driver after
    /// proofs land.
    pub fn advance_finalization_point(&self) -> Result<(), ServiceError> {
        let next = self.proof_storage.finalization_point()?.next();
        self.aggregator.modifier().set_next_finalization_point(next)?;
        Ok(())
    }

    /// Run the orchestrator at `now`.
    pub fn advance(&self, now: Duration) {
        self.orchestrator.advance(now);
    }

    /// Prepare and broadcast a proposal for the current local chain.
    pub fn propose(&self) {
        self.orchestrator.propose();
    }

    /// The current time per the service clock.
    pub fn now(&self) -> Duration {
        (self.time_supplier)()
    }

    /// The multi-step aggregator.
    pub fn aggregator(&self) -> &Arc<MultiStepAggregator> {
        &self.aggregator
    }

    /// The orchestrator.
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Refresh the exported gauges from the current state.
    pub fn report_metrics(&self) {
        let view = self.aggregator.view();
        let min_step = view.min_step_identifier();
        let metrics = metrics();
        metrics.active_steps.set(view.size() as i64);
        metrics.finalization_point.set(min_step.point as i64);
        metrics.finalization_round.set(min_step.round as i64);
        metrics.finalization_sub_round.set(min_step.sub_round as i64);
        metrics.orchestrator_sub_round.set(self.orchestrator.sub_round() as i64);
        metrics
            .orchestrator_sub_round_start_seconds
            .set(self.orchestrator.sub_round_start_time().unwrap_or_default().as_secs_f64());
    }
}
