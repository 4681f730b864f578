use alloy::primitives::B256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EthError {
    #[error("operation canceled")]
    Canceled,
    #[error("transaction {0} reverted")]
    TxFailed(B256),
    #[error("failed to subscribe to new headers: {0}")]
    SubscribeFailed(String),
    #[error(transparent)]
    Contract(#[from] alloy::contract::Error),
    #[error(transparent)]
    Transport(#[from] alloy::transports::TransportError),
    #[error(transparent)]
    PendingTransaction(#[from] alloy::providers::PendingTransactionError),
}

#[derive(Debug, Error)]
pub enum RelayerError {
    #[error("signing key does not match the swap claimer")]
    ClaimerMismatch,
    #[error("deployed bytecode does not match the known SwapFactory build")]
    UnknownFactoryBytecode,
    #[error("relaying is only supported for the ETH asset")]
    UnsupportedAsset,
    #[error("swap value must be strictly greater than the relayer fee")]
    SwapValueBelowFee,
    #[error("forwarder rejected the claim signature")]
    BadSignature,
    #[error("relayed claim transaction was not mined in time")]
    RelayedTransactionTimeout,
    #[error("relayed claim transaction not found after {0} attempts")]
    TransactionNotFound(u32),
    #[error("claim log emitted by unexpected contract address")]
    ClaimLogInvalidContractAddr,
    #[error("claim log has wrong topic count")]
    ClaimLogWrongTopicLength,
    #[error("claim log is not a Claimed event")]
    ClaimLogWrongEvent,
    #[error("claim log has wrong swap ID")]
    ClaimLogWrongSwapID,
    #[error("claim log has wrong secret")]
    ClaimLogWrongSecret,
    #[error("no relayer accepted the claim")]
    NoRelayerSucceeded,
    #[error("claim receipt missing for mined transaction {0}")]
    ReceiptMissing(B256),
    #[error("invalid secret length: expected 32, got {0}")]
    InvalidSecretLength(usize),
    #[error("operation canceled")]
    Canceled,
    #[error(transparent)]
    Eth(#[from] EthError),
    #[error("failed to sign forward request: {0}")]
    Signer(String),
}

impl From<alloy::contract::Error> for RelayerError {
    fn from(err: alloy::contract::Error) -> Self {
        Self::Eth(EthError::Contract(err))
    }
}

impl From<alloy::transports::TransportError> for RelayerError {
    fn from(err: alloy::transports::TransportError) -> Self {
        Self::Eth(EthError::Transport(err))
    }
}
