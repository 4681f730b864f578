use alloy::providers::{Provider, ProviderBuilder};
use eth_escrow::block::wait_for_eth_block_after_timestamp;
use eth_escrow::EthError;
use tokio_util::sync::CancellationToken;

fn unreachable_provider() -> alloy::providers::DynProvider {
    // The HTTP transport connects lazily, so building against a dead
    // endpoint performs no I/O.
    ProviderBuilder::new()
        .connect_http("http://127.0.0.1:1".parse().unwrap())
        .erased()
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[tokio::test]
async fn cancelled_token_wins_over_future_timestamp() {
    let provider = unreachable_provider();
    let token = CancellationToken::new();
    token.cancel();

    // One day out; without the cancellation check this would sleep forever.
    let ts = unix_now() + 24 * 60 * 60;
    let result = wait_for_eth_block_after_timestamp(&token, &provider, ts).await;
    assert!(matches!(result, Err(EthError::Canceled)));
}

#[tokio::test]
async fn cancellation_applies_while_watching_headers() {
    let provider = unreachable_provider();
    let token = CancellationToken::new();
    token.cancel();

    // A past timestamp skips the sleep and goes straight to the header
    // watch, which must still honor cancellation before any RPC call.
    let ts = unix_now().saturating_sub(60);
    let result = wait_for_eth_block_after_timestamp(&token, &provider, ts).await;
    assert!(matches!(result, Err(EthError::Canceled)));
}

#[tokio::test]
async fn surfaces_header_subscription_failure() {
    let provider = unreachable_provider();
    let token = CancellationToken::new();

    // Past timestamp, live token: the first header fetch fails because
    // nothing is listening on the endpoint.
    let ts = unix_now().saturating_sub(60);
    let result = wait_for_eth_block_after_timestamp(&token, &provider, ts).await;
    assert!(matches!(result, Err(EthError::SubscribeFailed(_))));
}
