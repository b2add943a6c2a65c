//! Core types for Keystone finalization.
//!
//! This crate provides the foundational types used throughout the
//! finalization implementation:
//!
//! - **Primitives**: [`Hash`], [`ShortHash`], cryptographic keys and signatures
//! - **Identifiers**: [`Height`], [`FinalizationPoint`], [`StepIdentifier`]
//! - **Protocol types**: [`FinalizationMessage`], [`FinalizationContext`]
//! - **Sortition**: [`VrfProof`] and [`VrfOutput`]
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer.

mod config;
mod context;
mod crypto;
mod hash;
mod identifiers;
mod message;
mod vrf;

pub use config::FinalizationConfig;
pub use context::{FinalizationContext, VoterEntry, VoterRecord};
pub use crypto::{KeyPair, PublicKey, Signature};
pub use hash::{Hash, ShortHash};
pub use identifiers::{FinalizationPoint, Height, HeightHashPair, StepIdentifier};
pub use message::{FinalizationMessage, MessageDecodeError, VoteSignature, MESSAGE_HEADER_SIZE};
pub use vrf::{VrfOutput, VrfProof};
