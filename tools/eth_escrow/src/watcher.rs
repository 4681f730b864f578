use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alloy::primitives::{Address, B256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::{Filter, Log};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(30);
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Polls for contract logs matching one topic-0 value, starting at a given
/// block, and forwards each match to a mailbox in (block, log-index) order.
pub struct EventFilter {
    token: CancellationToken,
    provider: DynProvider,
    contract: Address,
    from_block: u64,
    topic: B256,
    mailbox: mpsc::Sender<Log>,
    poll_interval: Duration,
    started: AtomicBool,
}

impl EventFilter {
    pub fn new(
        token: CancellationToken,
        provider: DynProvider,
        contract: Address,
        from_block: u64,
        topic: B256,
        mailbox: mpsc::Sender<Log>,
    ) -> Self {
        Self {
            token,
            provider,
            contract,
            from_block,
            topic,
            mailbox,
            poll_interval: DEFAULT_POLL_INTERVAL,
            started: AtomicBool::new(false),
        }
    }

    pub fn set_poll_interval(&mut self, poll_interval: Duration) {
        self.poll_interval = poll_interval;
    }

    /// Starts the polling task. Idempotent; the task runs until the token is
    /// cancelled or the mailbox receiver is dropped.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(run_filter(
            self.token.clone(),
            self.provider.clone(),
            self.contract,
            self.from_block,
            self.topic,
            self.mailbox.clone(),
            self.poll_interval,
        ));
    }
}

async fn run_filter(
    token: CancellationToken,
    provider: DynProvider,
    contract: Address,
    mut from_block: u64,
    topic: B256,
    mailbox: mpsc::Sender<Log>,
    poll_interval: Duration,
) {
    let mut consecutive_errors: u32 = 0;

    loop {
        let delay = if consecutive_errors == 0 {
            poll_interval
        } else {
            std::cmp::min(
                poll_interval.saturating_mul(2u32.saturating_pow(consecutive_errors)),
                MAX_ERROR_BACKOFF,
            )
        };

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let latest = match provider.get_block_number().await {
            Ok(latest) => latest,
            Err(err) => {
                consecutive_errors += 1;
                if consecutive_errors > MAX_CONSECUTIVE_ERRORS {
                    error!(%err, "Log watcher giving up after repeated RPC failures");
                    token.cancel();
                    return;
                }
                warn!(%err, consecutive_errors, "Failed to fetch block number; backing off");
                continue;
            }
        };

        if latest < from_block {
            consecutive_errors = 0;
            continue;
        }

        let filter = Filter::new()
            .address(contract)
            .event_signature(topic)
            .from_block(from_block)
            .to_block(latest);

        let mut logs = match provider.get_logs(&filter).await {
            Ok(logs) => logs,
            Err(err) => {
                consecutive_errors += 1;
                if consecutive_errors > MAX_CONSECUTIVE_ERRORS {
                    error!(%err, "Log watcher giving up after repeated RPC failures");
                    token.cancel();
                    return;
                }
                warn!(%err, consecutive_errors, "Failed to fetch logs; backing off");
                continue;
            }
        };
        consecutive_errors = 0;

        logs.sort_by_key(|log| (log.block_number.unwrap_or(0), log.log_index.unwrap_or(0)));
        for log in logs {
            debug!(block = ?log.block_number, "Delivering contract log");
            if mailbox.send(log).await.is_err() {
                // Receiver gone; the swap no longer wants events.
                return;
            }
        }

        from_block = latest + 1;
    }
}
