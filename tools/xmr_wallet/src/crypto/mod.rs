//! Monero key arithmetic for swap accounts.
//!
//! Auditor notes:
//! - Uses curve25519-dalek only (Quarkslab audited).
//! - No custom scalar/point arithmetic.

mod keys;

pub use keys::{
    joint_private_key_pair, sum_spend_and_view_keys, PrivateKeyPair, PrivateSpendKey,
    PrivateViewKey, PublicKey, PublicKeyPair,
};
