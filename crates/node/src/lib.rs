//! Node-level wiring for the finalization subsystem.
//!
//! [`FinalizationService`] assembles the core out of its collaborators: the
//! multi-step aggregator gets its message processor (context factory +
//! validation), its aggregator factory and its consensus sink from the
//! orchestrator, and the point-consensus sink persists proofs and notifies
//! the subscriber. The service exposes the node-facing handlers: the
//! message-range consumer (point filter, dedup, add, fan-out) and the
//! pull-messages query.
//!
//! [`AdvanceDriver`] drives time: a periodic tokio task that advances the
//! finalization point after a proof landed, times stages out and refreshes
//! the exported metrics.

mod context;
mod dedup;
mod driver;
mod metrics;
mod service;

pub use context::ContextFactory;
pub use dedup::RecentHashCache;
pub use driver::AdvanceDriver;
pub use metrics::{metrics, Metrics};
pub use service::{FinalizationService, ServiceError};

use keystone_types::{
    FinalizationMessage, FinalizationPoint, Hash, Height, VoterRecord,
};
use std::sync::Arc;
use std::time::Duration;

/// Observer of finalization events. Called exactly once per finalized point,
/// after the proof has been persisted.
pub trait FinalizationSubscriber: Send + Sync {
    /// A block was irrevocably finalized.
    fn notify_finalized_block(&self, height: Height, hash: Hash, point: FinalizationPoint);
}

/// Read view of the account-state cache: the voting-eligible accounts with
/// their weights and key registrations.
pub trait AccountStateView: Send + Sync {
    /// The current voting-eligible accounts.
    fn voting_records(&self) -> Vec<VoterRecord>;
}

/// Fans accepted messages out to peers.
pub trait MessageBroadcaster: Send + Sync {
    /// Broadcast `messages` to connected peers.
    fn broadcast(&self, messages: &[Arc<FinalizationMessage>]);
}

/// Supplies the current time, measured from an arbitrary fixed origin.
pub type TimeSupplier = Arc<dyn Fn() -> Duration + Send + Sync>;
