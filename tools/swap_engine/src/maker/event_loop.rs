use alloy::primitives::B256;
use alloy::rpc::types::Log;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SwapError;
use crate::event::{Event, EventType};
use crate::types::Status;

use super::MakerSwap;

/// Converts watcher logs into swap events. Logs arrive per-watcher in block
/// order; the handler task consumes the merged stream one event at a time.
pub(super) async fn forward_logs(
    token: CancellationToken,
    mut ready_rx: mpsc::Receiver<Log>,
    mut refunded_rx: mpsc::Receiver<Log>,
    event_tx: mpsc::Sender<Event>,
) {
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => return,
            log = ready_rx.recv() => match log {
                Some(log) => Event::ContractReady { log },
                None => return,
            },
            log = refunded_rx.recv() => match log {
                Some(log) => Event::EthRefunded { log },
                None => return,
            },
        };
        if event_tx.send(event).await.is_err() {
            return;
        }
    }
}

impl MakerSwap {
    /// Runs the swap to a terminal status. Exactly one event is handled at
    /// a time; all swap state lives on this task.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    debug!(swap = %self.info.offer_id, "swap context cancelled");
                    return;
                }
                event = self.event_rx.recv() => {
                    let Some(event) = event else { return };
                    if self.handle_event(event).await {
                        return;
                    }
                }
            }
        }
    }

    /// Dispatches one event. Returns true when the swap reached a terminal
    /// status and the loop should stop.
    pub(super) async fn handle_event(&mut self, event: Event) -> bool {
        let event_type = event.event_type();
        debug!(swap = %self.info.offer_id, %event_type, "handling swap event");

        match event {
            Event::EthLocked { message, ack } => {
                if self.next_expected_event != EventType::EthLocked {
                    let err = SwapError::UnexpectedEventInState {
                        got: EventType::EthLocked,
                        want: self.next_expected_event,
                    };
                    let _ = ack.send(Err(err.into()));
                    return self.abort();
                }
                match self.handle_eth_locked(message).await {
                    Ok(()) => {
                        self.next_expected_event = EventType::ContractReady;
                        let _ = ack.send(Ok(()));
                        false
                    }
                    Err(err) if err.is_canceled() => {
                        let _ = ack.send(Err(err.into()));
                        true
                    }
                    Err(err) => {
                        warn!(%err, "failed to handle ETH lock notification");
                        let _ = ack.send(Err(err.into()));
                        self.abort()
                    }
                }
            }
            Event::ContractReady { log } => {
                match self.next_expected_event {
                    EventType::ContractReady => {}
                    EventType::EthLocked => {
                        // A Ready log before the peer's lock notification
                        // breaks protocol ordering.
                        error!(
                            "{}",
                            SwapError::OutOfOrderEvent {
                                got: EventType::ContractReady,
                                want: EventType::EthLocked,
                            }
                        );
                        return self.abort();
                    }
                    EventType::None => return false, // already terminal; stale log
                    want => {
                        error!(
                            "{}",
                            SwapError::UnexpectedEventInState {
                                got: EventType::ContractReady,
                                want,
                            }
                        );
                        return self.abort();
                    }
                }
                let Some(_) = self.match_swap_log(&log) else {
                    return false;
                };
                match self.handle_contract_ready().await {
                    Ok(()) => {
                        self.finalize();
                        true
                    }
                    Err(err) if err.is_canceled() => true,
                    Err(err) => {
                        warn!(%err, "failed to claim after Ready event");
                        self.abort()
                    }
                }
            }
            Event::EthRefunded { log } => {
                let Some(topics) = self.match_swap_log(&log) else {
                    return false;
                };
                if topics.len() != 3 {
                    warn!("Refunded log has unexpected topic count");
                    return false;
                }
                let taker_secret = topics[2];
                info!("counterparty refunded on-chain; reclaiming XMR");
                match self.handle_eth_refunded(taker_secret).await {
                    Ok(()) => {
                        self.finalize();
                        true
                    }
                    Err(err) if err.is_canceled() => true,
                    Err(err) => {
                        error!(%err, "failed to reclaim XMR after refund");
                        self.abort()
                    }
                }
            }
            Event::Exit { ack } => {
                let result = self.handle_exit().await;
                let _ = ack.send(result);
                true
            }
            other => {
                error!(
                    "{}",
                    SwapError::UnexpectedEventInState {
                        got: other.event_type(),
                        want: self.next_expected_event,
                    }
                );
                self.abort()
            }
        }
    }

    /// `setReady` was observed; the contract is claimable.
    pub(super) async fn handle_contract_ready(&mut self) -> Result<(), SwapError> {
        self.set_status(Status::ContractReady);
        let tx_hash = self.claim_funds().await?;
        info!(%tx_hash, "claimed ETH-side funds");
        self.set_status(Status::CompletedSuccess);
        Ok(())
    }

    /// Orderly exit. Behavior depends on what the machine was waiting for:
    /// nothing locked yet means abort; XMR locked means we must stay until
    /// the contract either becomes ready or is refunded.
    pub(super) async fn handle_exit(&mut self) -> anyhow::Result<()> {
        debug!(
            next_expected = %self.next_expected_event,
            "attempting to exit swap"
        );

        let result: anyhow::Result<()> = match self.next_expected_event {
            EventType::EthLocked => {
                // Nothing irreversible happened yet.
                self.set_status(Status::CompletedAbort);
                Ok(())
            }
            EventType::ContractReady => {
                // Take exclusive control of the event channel; the next
                // relevant event must be ContractReady or ETHRefunded.
                info!("waiting for EventETHRefunded or EventContractReady");
                loop {
                    let event = tokio::select! {
                        _ = self.token.cancelled() => break Err(SwapError::Canceled.into()),
                        event = self.event_rx.recv() => match event {
                            Some(event) => event,
                            None => break Err(SwapError::Canceled.into()),
                        },
                    };
                    match event {
                        Event::ContractReady { log } => {
                            if self.match_swap_log(&log).is_none() {
                                continue;
                            }
                            info!("got EventContractReady");
                            break self.handle_contract_ready().await.map_err(Into::into);
                        }
                        Event::EthRefunded { log } => {
                            let Some(topics) = self.match_swap_log(&log) else {
                                continue;
                            };
                            if topics.len() != 3 {
                                continue;
                            }
                            info!("got EventETHRefunded");
                            break self.handle_eth_refunded(topics[2]).await.map_err(Into::into);
                        }
                        other => {
                            warn!(event = %other.event_type(), "ignoring event while exiting");
                        }
                    }
                }
            }
            EventType::None => Ok(()), // already completed
            want => {
                error!(next_expected = %want, "unexpected state in exit");
                self.set_status(Status::CompletedAbort);
                Err(SwapError::UnexpectedEventInState {
                    got: EventType::Exit,
                    want,
                }
                .into())
            }
        };

        self.finalize();
        result
    }

    /// Aborts the swap and finalizes. Always terminal.
    fn abort(&mut self) -> bool {
        self.set_status(Status::CompletedAbort);
        self.finalize();
        true
    }

    /// Returns the log's topics when it belongs to this swap (topic 1 is
    /// the contract swap ID), or None for stale or foreign logs.
    fn match_swap_log(&self, log: &Log) -> Option<Vec<B256>> {
        let topics = log.inner.data.topics();
        if topics.len() < 2 {
            return None;
        }
        if topics[1] != self.contract_swap_id {
            debug!("ignoring log for a different swap");
            return None;
        }
        Some(topics.to_vec())
    }
}
