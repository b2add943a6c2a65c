//! Pull-messages synchronization round trip.

use crate::NetworkMessage;
use keystone_types::{FinalizationMessage, ShortHash, StepIdentifier};
use serde::{Deserialize, Serialize};

/// Request for finalization messages a peer does not know yet: the step
/// floor followed by the short hashes of everything it already has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullMessagesRequest {
    /// Only messages at or above this step are requested.
    pub step_identifier: StepIdentifier,
    /// Short hashes of the messages the requester already knows.
    pub known_short_hashes: Vec<ShortHash>,
}

impl NetworkMessage for PullMessagesRequest {
    fn message_type_id() -> &'static str {
        "finalization.pull.request"
    }
}

/// Response: the unknown messages, truncated to the responder's configured
/// size cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullMessagesResponse {
    /// Messages the requester was missing.
    pub messages: Vec<FinalizationMessage>,
}

impl NetworkMessage for PullMessagesResponse {
    fn message_type_id() -> &'static str {
        "finalization.pull.response"
    }
}
