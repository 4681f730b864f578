use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::types::{Result, XmrWalletError};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub timeout: Duration,
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(6_000),
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            jitter_ms: 250,
        }
    }
}

impl RetryConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        let timeout_ms = read_env_u64("XMR_WALLET_RPC_TIMEOUT_MS", default.timeout.as_millis() as u64);
        let max_retries = read_env_u64("XMR_WALLET_RPC_MAX_RETRIES", default.max_retries as u64);
        let base_delay_ms = read_env_u64("XMR_WALLET_RPC_BASE_DELAY_MS", default.base_delay.as_millis() as u64);
        let max_delay_ms = read_env_u64("XMR_WALLET_RPC_MAX_DELAY_MS", default.max_delay.as_millis() as u64);
        let jitter_ms = read_env_u64("XMR_WALLET_RPC_JITTER_MS", default.jitter_ms);
        Self {
            timeout: Duration::from_millis(timeout_ms),
            max_retries: max_retries as usize,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            jitter_ms,
        }
    }
}

fn read_env_u64(key: &str, fallback: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}

/// Runs `action` with a per-attempt timeout and bounded exponential backoff.
/// Cancellation through `token` aborts the attempt and the backoff sleep.
pub async fn retry_with_timeout<T, F, Fut>(
    token: &CancellationToken,
    label: &'static str,
    config: &RetryConfig,
    mut action: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let attempts = config.max_retries.saturating_add(1);
    for attempt in 0..attempts {
        let outcome = tokio::select! {
            _ = token.cancelled() => return Err(XmrWalletError::Canceled),
            outcome = timeout(config.timeout, action()) => outcome,
        };
        match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) if err.is_canceled() => return Err(err),
            Ok(Err(err)) => {
                if attempt + 1 >= attempts {
                    return Err(err);
                }
                warn!(attempt = attempt + 1, "RPC error on {label}; retrying");
            }
            Err(_) => {
                if attempt + 1 >= attempts {
                    return Err(XmrWalletError::RetryExhausted(label));
                }
                warn!(attempt = attempt + 1, "RPC timeout on {label}; retrying");
            }
        }

        let backoff = config
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt as u32));
        let capped = std::cmp::min(backoff, config.max_delay);
        let jitter = if config.jitter_ms == 0 {
            Duration::from_millis(0)
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=config.jitter_ms))
        };
        tokio::select! {
            _ = token.cancelled() => return Err(XmrWalletError::Canceled),
            _ = sleep(capped + jitter) => {}
        }
    }

    Err(XmrWalletError::RetryExhausted(label))
}
