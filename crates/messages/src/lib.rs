//! Network messages for the finalization protocol.

mod gossip;
mod pull;

pub use gossip::FinalizationMessageBatch;
pub use pull::{PullMessagesRequest, PullMessagesResponse};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Wire codec failure.
#[derive(Debug, Error)]
#[error("message codec error: {0}")]
pub struct CodecError(String);

/// A message that can cross the wire.
///
/// `message_type_id` is the stable routing key the transport layer uses to
/// dispatch payloads; the byte encoding is bincode with fixed-width
/// little-endian integers.
pub trait NetworkMessage: Serialize + DeserializeOwned {
    /// Stable identifier used for transport routing.
    fn message_type_id() -> &'static str;

    /// Encode for the wire.
    fn to_wire_bytes(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|error| CodecError(error.to_string()))
    }

    /// Decode from the wire.
    fn from_wire_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|error| CodecError(error.to_string()))
    }
}
