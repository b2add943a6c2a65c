//! Finalization context construction.

use crate::AccountStateView;
use keystone_storage::{BlockStorageView, ProofStorage, StorageError};
use keystone_types::{FinalizationConfig, FinalizationContext};
use std::sync::Arc;

/// Builds [`FinalizationContext`] snapshots.
///
/// Every build re-reads proof storage, block storage and the account view,
/// so the context always reflects the latest finalized tip. Storage read
/// failures propagate; they indicate local corruption.
pub struct ContextFactory {
    config: FinalizationConfig,
    proof_storage: Arc<dyn ProofStorage>,
    block_storage: Arc<dyn BlockStorageView>,
    account_state: Arc<dyn AccountStateView>,
}

impl ContextFactory {
    /// Create a factory over the storage views.
    pub fn new(
        config: FinalizationConfig,
        proof_storage: Arc<dyn ProofStorage>,
        block_storage: Arc<dyn BlockStorageView>,
        account_state: Arc<dyn AccountStateView>,
    ) -> Self {
        Self { config, proof_storage, block_storage, account_state }
    }

    /// Build a context for the point following the last finalized one.
    pub fn build(&self) -> Result<FinalizationContext, StorageError> {
        let point = self.proof_storage.finalization_point()?.next();
        let height = self.proof_storage.finalized_height()?;
        let generation_hash = self.block_storage.load_generation_hash(height)?;

        Ok(FinalizationContext::new(
            point,
            height,
            generation_hash,
            self.config.clone(),
            self.account_state.voting_records(),
        ))
    }
}
