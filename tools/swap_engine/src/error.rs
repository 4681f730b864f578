use alloy::primitives::U256;
use thiserror::Error;

use crate::event::EventType;
use crate::types::{Hash, Status};

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("{got} arrived while still expecting {want}")]
    OutOfOrderEvent { got: EventType, want: EventType },
    #[error("unexpected event {got} in state expecting {want}")]
    UnexpectedEventInState { got: EventType, want: EventType },
    #[error("contract swap ID does not match the notified swap")]
    SwapIdMismatch,
    #[error("we are not the claimer of the locked swap")]
    InvalidClaimer,
    #[error("locked value {got} does not match expected {want}")]
    ValueMismatch { got: U256, want: U256 },
    #[error("locked asset does not match the offer")]
    AssetMismatch,
    #[error("contract key commitment does not match the exchanged keys")]
    CommitmentMismatch,
    #[error("contract timeouts are out of order")]
    InvalidTimeouts,
    #[error("timeout0 leaves no room for the XMR lock to confirm")]
    TimeoutTooSoon,
    #[error("swap {0} is not pending on-chain")]
    SwapNotPending(Hash),
    #[error("no contract is set for this swap")]
    ContractNotSet,
    #[error("provided amount is outside the offer range")]
    AmountOutOfRange,
    #[error("counterparty keys are missing")]
    MissingCounterpartyKeys,
    #[error("swap status {0} cannot be recovered")]
    InvalidStageForRecovery(Status),
    #[error("recovery record {0:?} is missing for swap {1}")]
    MissingRecoveryRecord(&'static str, Hash),
    #[error("operation canceled")]
    Canceled,
    #[error(transparent)]
    Eth(#[from] eth_escrow::EthError),
    #[error(transparent)]
    Relayer(#[from] eth_escrow::RelayerError),
    #[error(transparent)]
    Xmr(#[from] xmr_wallet::XmrWalletError),
    #[error(transparent)]
    Crypto(#[from] xmr_wallet::CryptoError),
    #[error(transparent)]
    Keys(#[from] crate::keys::KeysError),
    #[error(transparent)]
    Manager(#[from] crate::manager::ManagerError),
    #[error(transparent)]
    Offer(#[from] crate::offers::OfferError),
    #[error(transparent)]
    Message(#[from] crate::message::MessageError),
    #[error(transparent)]
    Amount(#[from] crate::amounts::AmountError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SwapError {
    /// True when the failure is cancellation rather than a protocol or RPC
    /// fault.
    pub fn is_canceled(&self) -> bool {
        match self {
            SwapError::Canceled => true,
            SwapError::Eth(eth_escrow::EthError::Canceled) => true,
            SwapError::Relayer(eth_escrow::RelayerError::Canceled) => true,
            SwapError::Xmr(err) => err.is_canceled(),
            _ => false,
        }
    }
}
