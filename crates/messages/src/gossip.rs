//! Gossip payloads.

use crate::NetworkMessage;
use keystone_types::FinalizationMessage;
use serde::{Deserialize, Serialize};

/// A batch of finalization messages pushed to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationMessageBatch {
    /// The messages being gossiped.
    pub messages: Vec<FinalizationMessage>,
}

impl FinalizationMessageBatch {
    /// Create a batch.
    pub fn new(messages: Vec<FinalizationMessage>) -> Self {
        Self { messages }
    }
}

impl NetworkMessage for FinalizationMessageBatch {
    fn message_type_id() -> &'static str {
        "finalization.messages"
    }
}
