use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::rpc::XmrWallet;
use crate::types::{Result, XmrWalletError};

/// Waits for `count` new blocks past the current height, polling at
/// `block_sleep` intervals. The wallet is refreshed to the chain tip before
/// returning the final height.
pub async fn wait_for_blocks(
    token: &CancellationToken,
    wallet: &XmrWallet,
    count: u64,
    block_sleep: Duration,
) -> Result<u64> {
    let start_height = wallet.get_height(token).await?;
    let end_height = start_height + count;
    let mut prev_height = start_height.saturating_sub(1);

    loop {
        let height = wallet.get_height(token).await?;

        if height >= end_height {
            wallet.refresh(token, None).await?;
            return Ok(height);
        }

        if height > prev_height {
            debug!(height, target = end_height, "Waiting for next Monero block");
            prev_height = height;
        }

        tokio::select! {
            _ = token.cancelled() => return Err(XmrWalletError::Canceled),
            _ = tokio::time::sleep(block_sleep) => {}
        }
    }
}
