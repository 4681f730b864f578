mod retry;
mod wallet;

pub use retry::{retry_with_timeout, RetryConfig};
pub use wallet::{Balance, TransferReceipt, XmrWallet};
