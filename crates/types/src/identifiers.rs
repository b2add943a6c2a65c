//! Identifier newtypes for heights, finalization points and voting steps.

use crate::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Block height.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Height(pub u64);

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotone sequence number identifying one round of the outer finalization
/// protocol. A point only advances once the previous point is finalized.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct FinalizationPoint(pub u64);

impl FinalizationPoint {
    /// The point following this one.
    pub fn next(&self) -> FinalizationPoint {
        FinalizationPoint(self.0 + 1)
    }
}

impl fmt::Display for FinalizationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a single consensus stage as a totally ordered
/// `(point, round, sub_round)` triple.
///
/// The derived ordering is lexicographic, which is exactly the acceptance and
/// pruning order the multi-step aggregator relies on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct StepIdentifier {
    /// Finalization point this step belongs to.
    pub point: u64,
    /// Round within the point.
    pub round: u64,
    /// Stage within the round (see the orchestrator's sub-round mapping).
    pub sub_round: u64,
}

impl StepIdentifier {
    /// Create a step identifier.
    pub fn new(point: u64, round: u64, sub_round: u64) -> Self {
        Self { point, round, sub_round }
    }

    /// The finalization point component as a typed value.
    pub fn finalization_point(&self) -> FinalizationPoint {
        FinalizationPoint(self.point)
    }

    /// Encode as 24 little-endian bytes. Used both on the wire and as the
    /// sortition VRF input suffix, so the layout must stay stable.
    pub fn to_bytes(&self) -> [u8; 24] {
        let mut bytes = [0u8; 24];
        bytes[..8].copy_from_slice(&self.point.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.round.to_le_bytes());
        bytes[16..].copy_from_slice(&self.sub_round.to_le_bytes());
        bytes
    }

    /// Decode from the 24-byte layout produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8; 24]) -> Self {
        Self {
            point: u64::from_le_bytes(bytes[..8].try_into().unwrap()),
            round: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            sub_round: u64::from_le_bytes(bytes[16..].try_into().unwrap()),
        }
    }
}

impl fmt::Display for StepIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.point, self.round, self.sub_round)
    }
}

/// A specific block, identified by height and hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HeightHashPair {
    /// Block height.
    pub height: Height,
    /// Block hash.
    pub hash: Hash,
}

impl HeightHashPair {
    /// Create a pair.
    pub fn new(height: Height, hash: Hash) -> Self {
        Self { height, hash }
    }
}

impl fmt::Display for HeightHashPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.hash, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_identifier_ordering_is_lexicographic() {
        let base = StepIdentifier::new(6, 4, 5);

        assert!(StepIdentifier::new(5, 9, 9) < base);
        assert!(StepIdentifier::new(6, 3, 9) < base);
        assert!(StepIdentifier::new(6, 4, 4) < base);
        assert_eq!(StepIdentifier::new(6, 4, 5), base);
        assert!(StepIdentifier::new(6, 4, 6) > base);
        assert!(StepIdentifier::new(6, 5, 0) > base);
        assert!(StepIdentifier::new(7, 0, 0) > base);
    }

    #[test]
    fn test_step_identifier_byte_roundtrip() {
        let step = StepIdentifier::new(3, 4, 5);
        assert_eq!(StepIdentifier::from_bytes(&step.to_bytes()), step);
    }

    #[test]
    fn test_finalization_point_next() {
        assert_eq!(FinalizationPoint(6).next(), FinalizationPoint(7));
    }
}
