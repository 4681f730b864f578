//! Cross-group discrete-log equality proofs.
//!
//! A swap secret is one 32-byte scalar committed to on two curves: ed25519
//! (the Monero spend key) and secp256k1 (the Ethereum contract commitment).
//! This crate generates such a scalar together with a proof that both public
//! points share it, and verifies proofs received from a counterparty.
//!
//! Auditor notes:
//! - Only curve25519-dalek and k256 are used for curve operations.
//! - The Fiat-Shamir challenge is domain-separated Blake2s over the full
//!   transcript (both generators, both public points, both commitments).

mod keys;
mod proof;

pub use keys::{Secp256k1PublicKey, Secret};
pub use proof::{generate, verify, Error, GeneratedKeys, Proof, VerifiedKeys, PROOF_SIZE};
