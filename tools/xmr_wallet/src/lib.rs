//! Monero wallet integration for real swaps.
//!
//! Auditor notes:
//! - All crypto primitives are isolated under `crypto/`.
//! - Only audited libraries are used for curve operations.
//! - RPC access is a thin wrapper over `monero-rpc`; every call is
//!   cancellable and retried with bounded backoff, except transfers, which
//!   are submitted exactly once.

pub use monero_rpc::monero;

pub mod claim;
pub mod crypto;
pub mod rpc;
pub mod types;
pub mod wait;
pub mod watcher;

pub use claim::{sweep_joint_account, SweepParams};
pub use crypto::{
    joint_private_key_pair, sum_spend_and_view_keys, PrivateKeyPair, PrivateSpendKey,
    PrivateViewKey, PublicKey, PublicKeyPair,
};
pub use rpc::{Balance, RetryConfig, TransferReceipt, XmrWallet};
pub use types::{CryptoError, Result, XmrWalletError};
pub use wait::wait_for_blocks;
pub use watcher::{LockWatcher, WatcherConfig, WatcherEvent, WatcherState};
