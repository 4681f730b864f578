use jsonrpc_core::types::error::Error as RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid compressed point")]
    InvalidPoint,
    #[error("small-order point")]
    SmallOrderPoint,
    #[error("non-canonical scalar")]
    InvalidScalar,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Error)]
pub enum XmrWalletError {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("operation canceled")]
    Canceled,
    #[error("rpc retry exhausted for {0}")]
    RetryExhausted(&'static str),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl XmrWalletError {
    /// True when the error came from cancellation rather than a fault.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

pub type Result<T> = std::result::Result<T, XmrWalletError>;
