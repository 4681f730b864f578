use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy::eips::BlockNumberOrTag;
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::Header;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::EthError;

const HEADER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Waits for the first block whose timestamp is at or past `ts` (unix
/// seconds). Sleeps on the local clock until `ts` first, then watches new
/// headers; a timestamp already in the past skips straight to the header
/// watch.
pub async fn wait_for_eth_block_after_timestamp(
    token: &CancellationToken,
    provider: &DynProvider,
    ts: u64,
) -> Result<Header, EthError> {
    let now = unix_now();
    if ts > now {
        debug!(remaining_secs = ts - now, "Sleeping until contract timestamp");
        tokio::select! {
            _ = token.cancelled() => return Err(EthError::Canceled),
            _ = tokio::time::sleep(Duration::from_secs(ts - now)) => {}
        }
    }

    loop {
        if token.is_cancelled() {
            return Err(EthError::Canceled);
        }

        let block = provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|err| EthError::SubscribeFailed(err.to_string()))?;

        if let Some(block) = block {
            if block.header.timestamp >= ts {
                return Ok(block.header);
            }
        }

        tokio::select! {
            _ = token.cancelled() => return Err(EthError::Canceled),
            _ = tokio::time::sleep(HEADER_POLL_INTERVAL) => {}
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
