//! Message validation and sortition vote-weight derivation.
//!
//! [`process_message`] is the acceptance gate the multi-step aggregator runs
//! every incoming vote through. The checks are ordered and the first failure
//! short-circuits: signature, voter eligibility, sortition proof, selection.
//! All four inputs to the weight derivation are consensus-visible, so every
//! node derives the same vote count for a given message.

use keystone_types::{
    FinalizationContext, FinalizationMessage, Hash, Height, KeyPair, Signature, StepIdentifier,
    VoteSignature, VrfOutput, VrfProof,
};
use tracing::trace;

/// Outcome of processing a finalization message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMessageResult {
    /// Invalid message signature.
    FailureMessageSignature,
    /// Signer is not an eligible voter for this point.
    FailureVoter,
    /// Invalid sortition hash proof.
    FailureSortitionHashProof,
    /// Sortition selected zero votes.
    FailureSelection,
    /// Processing succeeded.
    Success,
}

/// Validate `message` against `context`.
///
/// Returns the processing result and the message's vote weight; the weight is
/// zero unless the result is [`ProcessMessageResult::Success`].
pub fn process_message(
    message: &FinalizationMessage,
    context: &FinalizationContext,
) -> (ProcessMessageResult, u64) {
    let signer = message.signer();
    if !signer.verify(&message.signing_bytes(), &message.signature.signature) {
        return (ProcessMessageResult::FailureMessageSignature, 0);
    }

    let Some(voter) = context.lookup(&signer) else {
        return (ProcessMessageResult::FailureVoter, 0);
    };

    let input = context.sortition_input(&message.step);
    let Some(output) = message.sortition_proof.verify(&input, &voter.vrf_public_key) else {
        return (ProcessMessageResult::FailureSortitionHashProof, 0);
    };

    let num_votes =
        derive_vote_count(&output, voter.weight, context.total_weight(), context.config().size);
    if num_votes == 0 {
        return (ProcessMessageResult::FailureSelection, 0);
    }

    trace!(step = %message.step, num_votes, "message accepted");
    (ProcessMessageResult::Success, num_votes)
}

/// Derive a voter's vote count for a step from its VRF output.
///
/// Randomized rounding of the expected count `size * weight / total_weight`:
/// the integer part is guaranteed and the fractional part becomes one extra
/// vote with matching probability, using the VRF output as the uniform draw.
pub fn derive_vote_count(output: &VrfOutput, weight: u64, total_weight: u64, size: u64) -> u64 {
    if weight == 0 || total_weight == 0 {
        return 0;
    }

    let scaled = size as u128 * weight as u128;
    let base = (scaled / total_weight as u128) as u64;
    let remainder = scaled % total_weight as u128;

    // extra vote with probability remainder / total_weight
    let extra = (output.draw() as u128 * total_weight as u128) < (remainder << 64);
    base + extra as u64
}

/// Build a signed finalization message for a local voter.
///
/// Returns `None` when the voting key is not eligible in `context` or when
/// sortition does not select the voter for this step.
pub fn prepare_message(
    voting_key_pair: &KeyPair,
    vrf_key_pair: &KeyPair,
    step: StepIdentifier,
    height: Height,
    hashes: Vec<Hash>,
    context: &FinalizationContext,
) -> Option<FinalizationMessage> {
    let voter = context.lookup(&voting_key_pair.public_key())?;

    let sortition_proof = VrfProof::generate(&context.sortition_input(&step), vrf_key_pair);
    let num_votes = derive_vote_count(
        &sortition_proof.output(),
        voter.weight,
        context.total_weight(),
        context.config().size,
    );
    if num_votes == 0 {
        return None;
    }

    let mut message = FinalizationMessage {
        step,
        height,
        signature: VoteSignature {
            voting_public_key: voting_key_pair.public_key(),
            signature: Signature::zero(),
        },
        sortition_proof,
        hashes,
    };
    message.signature.signature = voting_key_pair.sign(&message.signing_bytes());
    Some(message)
}
