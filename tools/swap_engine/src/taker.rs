//! Taker-side swap state machine: we lock the ETH-side asset and receive
//! XMR. Mirror of the maker machine with the roles of the two chains
//! swapped: lock ETH, notify, wait for the XMR lock, call `setReady`, learn
//! the maker's secret from the `Claimed` log and sweep the joint account.

use std::sync::Arc;

use alloy::primitives::{B256, U256};
use alloy::rpc::types::Log;
use eth_escrow::SwapFactory;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use xmr_wallet::{
    joint_private_key_pair, sum_spend_and_view_keys, PrivateViewKey, PublicKey, PublicKeyPair,
};

use crate::amounts::{eth_to_wei, xmr_to_piconero};
use crate::backend::Backend;
use crate::db::{CounterpartyKeys, EthereumSwapInfo, OngoingOffer};
use crate::error::SwapError;
use crate::event::{Event, EventType};
use crate::keys::{
    generate_keys_and_proof, secp256k1_commitment, spend_key_from_contract_secret,
    verify_keys_and_proof, KeysAndProof,
};
use crate::message::{Message, NotifyEthLocked, SendKeysMessage};
use crate::offers::Offer;
use crate::types::{Hash, ProvidesCoin, Status, StatusSender, SwapInfo};

const EVENT_CHANNEL_SIZE: usize = 16;
const LOG_CHANNEL_SIZE: usize = 16;

/// Caller-facing handle to a running taker swap.
pub struct TakerHandle {
    pub offer_id: Hash,
    event_tx: mpsc::Sender<Event>,
    token: CancellationToken,
    done_rx: oneshot::Receiver<()>,
}

impl TakerHandle {
    /// Forwards the maker's `SendKeysMessage`; resolves with our
    /// `NotifyETHLocked` reply once the ETH is locked.
    pub async fn keys_received(&self, message: SendKeysMessage) -> anyhow::Result<Message> {
        let (ack, response) = oneshot::channel();
        self.event_tx
            .send(Event::KeysReceived { message, ack })
            .await
            .map_err(|_| anyhow::anyhow!("swap event loop has shut down"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("swap event loop dropped the event"))?
    }

    pub async fn exit(&self) -> anyhow::Result<()> {
        let (ack, response) = oneshot::channel();
        if self.event_tx.send(Event::Exit { ack }).await.is_err() {
            return Ok(());
        }
        match response.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }

    pub async fn done(self) {
        let _ = self.done_rx.await;
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }
}

pub struct TakerSwap {
    backend: Arc<Backend>,
    token: CancellationToken,

    info: SwapInfo,
    offer: Offer,

    keys: KeysAndProof,
    maker_public_spend_key: Option<PublicKey>,
    maker_private_view_key: Option<PrivateViewKey>,

    contract_swap: Option<SwapFactory::Swap>,
    contract_swap_id: Hash,
    t1: u64,
    eth_locked: bool,

    next_expected_event: EventType,

    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    claimed_tx: mpsc::Sender<Log>,
    done_tx: Option<oneshot::Sender<()>>,
}

impl TakerSwap {
    /// Starts a swap against an advertised offer, providing `eth_amount` of
    /// the offer's asset. Returns the opening `SendKeysMessage` to send.
    pub async fn new_from_offer(
        backend: Arc<Backend>,
        offer: Offer,
        eth_amount: bigdecimal::BigDecimal,
    ) -> Result<
        (
            TakerSwap,
            TakerHandle,
            mpsc::UnboundedReceiver<Status>,
            Message,
        ),
        SwapError,
    > {
        offer.validate()?;
        let xmr_amount = offer.exchange_rate.to_xmr_amount(&eth_amount);
        if !offer.contains_amount(&xmr_amount) {
            return Err(SwapError::AmountOutOfRange);
        }

        let token = backend.new_swap_token();
        let monero_start_height = backend.xmr.get_height(&token).await?;

        let (status_sender, status_rx) = StatusSender::channel();
        let mut info = SwapInfo::new(
            offer.id,
            ProvidesCoin::Xmr,
            eth_amount.clone(),
            xmr_amount,
            offer.exchange_rate.clone(),
            offer.eth_asset,
            Status::KeysExchanged,
            monero_start_height,
            status_sender,
        );
        backend.swap_manager.add_swap(&info)?;

        let keys = generate_keys_and_proof()?;
        backend
            .recovery_db
            .put_swap_private_key(&offer.id, keys.private_key_pair.spend_key())?;
        backend.recovery_db.put_ongoing_offer(
            &offer.id,
            &OngoingOffer {
                offer: offer.clone(),
                status: Status::KeysExchanged,
                monero_start_height,
                extra: Default::default(),
            },
        )?;

        info.set_status(Status::KeysExchanged);

        let message = Message::SendKeys(SendKeysMessage {
            offer_id: Some(offer.id),
            provided_amount: eth_amount,
            public_spend_key: *keys.public_key_pair.spend_key(),
            private_view_key: keys.private_key_pair.view_key().clone(),
            dleq_proof: keys.dleq_proof.to_bytes().to_vec(),
            secp256k1_public_key: keys.secp256k1_public.clone(),
            eth_address: None,
        });

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (claimed_tx, claimed_rx) = mpsc::channel(LOG_CHANNEL_SIZE);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(forward_claimed_logs(
            token.clone(),
            claimed_rx,
            event_tx.clone(),
        ));

        let handle = TakerHandle {
            offer_id: offer.id,
            event_tx: event_tx.clone(),
            token: token.clone(),
            done_rx,
        };

        let swap = TakerSwap {
            backend,
            token,
            info,
            offer,
            keys,
            maker_public_spend_key: None,
            maker_private_view_key: None,
            contract_swap: None,
            contract_swap_id: Hash::ZERO,
            t1: 0,
            eth_locked: false,
            next_expected_event: EventType::KeysReceived,
            event_rx,
            event_tx,
            claimed_tx,
            done_tx: Some(done_tx),
        };

        Ok((swap, handle, status_rx, message))
    }

    pub fn offer_id(&self) -> Hash {
        self.info.offer_id
    }

    /// Runs the swap to a terminal status; one event at a time.
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

    async fn handle_event(&mut self, event: Event) -> bool {
        let event_type = event.event_type();
        debug!(swap = %self.info.offer_id, %event_type, "handling swap event");

        match event {
            Event::KeysReceived { message, ack } => {
                if self.next_expected_event != EventType::KeysReceived {
                    let err = SwapError::UnexpectedEventInState {
                        got: EventType::KeysReceived,
                        want: self.next_expected_event,
                    };
                    let _ = ack.send(Err(err.into()));
                    return self.abort();
                }
                match self.handle_keys_received(message).await {
                    Ok(reply) => {
                        self.next_expected_event = EventType::XmrLocked;
                        let _ = ack.send(Ok(reply));
                        false
                    }
                    Err(err) if err.is_canceled() => {
                        let _ = ack.send(Err(err.into()));
                        true
                    }
                    Err(err) => {
                        warn!(%err, "failed to lock ETH after key exchange");
                        let _ = ack.send(Err(err.into()));
                        self.abort()
                    }
                }
            }
            Event::XmrLocked { lock_height } => {
                if self.next_expected_event != EventType::XmrLocked {
                    return false; // stale watcher notification
                }
                match self.handle_xmr_locked(lock_height).await {
                    Ok(()) => {
                        self.next_expected_event = EventType::Claimed;
                        false
                    }
                    Err(err) if err.is_canceled() => true,
                    Err(err) => {
                        // The ETH is locked; a refund stays possible at t1,
                        // so keep watching instead of aborting.
                        warn!(%err, "failed to set the contract ready");
                        false
                    }
                }
            }
            Event::Claimed { log } => {
                if self.next_expected_event != EventType::Claimed
                    && self.next_expected_event != EventType::XmrLocked
                {
                    return false;
                }
                let Some(secret) = self.claimed_log_secret(&log) else {
                    return false;
                };
                match self.handle_claimed(secret).await {
                    Ok(()) => {
                        self.finalize();
                        true
                    }
                    Err(err) if err.is_canceled() => true,
                    Err(err) => {
                        error!(%err, "failed to sweep XMR after claim");
                        self.abort()
                    }
                }
            }
            Event::ShouldRefund => {
                if !self.info.status.is_ongoing() {
                    return false;
                }
                match self.handle_should_refund().await {
                    Ok(()) => {
                        self.finalize();
                        true
                    }
                    Err(err) if err.is_canceled() => true,
                    Err(err) => {
                        error!(%err, "failed to refund locked ETH");
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

    /// Verifies the maker's keys and locks the ETH-side asset, answering
    /// with `NotifyETHLocked`.
    async fn handle_keys_received(
        &mut self,
        message: SendKeysMessage,
    ) -> Result<Message, SwapError> {
        let verified = verify_keys_and_proof(
            &message.dleq_proof,
            &message.secp256k1_public_key,
            &message.public_spend_key,
        )?;
        let maker_eth_address = message.eth_address.ok_or(SwapError::MissingCounterpartyKeys)?;

        self.maker_public_spend_key = Some(verified.public_spend_key);
        self.maker_private_view_key = Some(message.private_view_key.clone());

        self.backend.recovery_db.put_counterparty_swap_keys(
            &self.info.offer_id,
            &CounterpartyKeys {
                public_spend_key: verified.public_spend_key,
                private_view_key: message.private_view_key,
            },
        )?;

        // Checkpoint before the irreversible ETH lock.
        self.backend.recovery_db.put_ongoing_offer(
            &self.info.offer_id,
            &OngoingOffer {
                offer: self.offer.clone(),
                status: Status::EthLocked,
                monero_start_height: self.info.monero_start_height,
                extra: Default::default(),
            },
        )?;

        let value = eth_to_wei(&self.info.provided_amount)?;
        let timeout_duration = self.backend.env.contract_timeout.as_secs();
        let mut nonce_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = U256::from_be_bytes(nonce_bytes);

        let pub_key_claim = secp256k1_commitment(&verified.secp256k1_public);
        let pub_key_refund = secp256k1_commitment(&self.keys.secp256k1_public);

        let receipt = self
            .backend
            .eth
            .new_swap(
                &self.token,
                pub_key_claim,
                pub_key_refund,
                maker_eth_address,
                U256::from(timeout_duration),
                self.offer.eth_asset.address(),
                value,
                nonce,
            )
            .await?;

        let t0 = receipt.block_timestamp + timeout_duration;
        let t1 = t0 + timeout_duration;
        let contract_address = self.backend.eth.swap_factory_addr();
        let swap = SwapFactory::Swap {
            owner: self.backend.eth.address(),
            claimer: maker_eth_address,
            pubKeyClaim: pub_key_claim,
            pubKeyRefund: pub_key_refund,
            timeout0: U256::from(t0),
            timeout1: U256::from(t1),
            asset: self.offer.eth_asset.address(),
            value,
            nonce,
        };
        let swap_id = eth_escrow::swap_id(&swap);

        self.backend.recovery_db.put_ethereum_swap_info(
            &self.info.offer_id,
            &EthereumSwapInfo {
                start_block: receipt.block_number,
                swap_id,
                swap: swap.clone(),
                contract_address,
            },
        )?;

        self.contract_swap = Some(swap.clone());
        self.contract_swap_id = swap_id;
        self.t1 = t1;
        self.eth_locked = true;
        self.set_status(Status::EthLocked);
        info!(tx_hash = %receipt.tx_hash, %swap_id, "locked ETH-side asset");

        // Watch for the claim from the lock block onward.
        self.backend.eth.spawn_event_filter(
            self.token.clone(),
            contract_address,
            receipt.block_number,
            eth_escrow::claimed_topic(),
            self.claimed_tx.clone(),
        );

        self.spawn_xmr_lock_watch();
        self.spawn_refund_timer();

        Ok(Message::NotifyEthLocked(NotifyEthLocked {
            address: contract_address,
            tx_hash: receipt.tx_hash,
            contract_swap_id: swap_id,
            contract_swap: swap,
        }))
    }

    fn spawn_xmr_lock_watch(&self) {
        let backend = self.backend.clone();
        let token = self.token.clone();
        let event_tx = self.event_tx.clone();
        let maker_spend = self.maker_public_spend_key;
        let maker_view = self.maker_private_view_key.clone();
        let our_pubs = self.keys.public_key_pair;
        let expected = self.info.expected_amount.clone();

        tokio::spawn(async move {
            let (Some(maker_spend), Some(maker_view)) = (maker_spend, maker_view) else {
                return;
            };
            let maker_pubs = PublicKeyPair::new(maker_spend, maker_view.public());
            let joint = sum_spend_and_view_keys(&maker_pubs, &our_pubs);
            let address = match joint.address(backend.env.monero_network) {
                Ok(address) => address,
                Err(err) => {
                    error!(%err, "failed to derive joint account address");
                    return;
                }
            };
            let amount = match xmr_to_piconero(&expected) {
                Ok(amount) => amount,
                Err(err) => {
                    error!(%err, "invalid expected XMR amount");
                    return;
                }
            };

            match backend
                .xmr
                .watch_for_lock(
                    &token,
                    &address,
                    amount,
                    backend.env.min_spend_confirmations,
                )
                .await
            {
                Ok(lock_height) => {
                    let _ = event_tx.send(Event::XmrLocked { lock_height }).await;
                }
                Err(err) if err.is_canceled() => {}
                Err(err) => warn!(%err, "XMR lock watch failed"),
            }
        });
    }

    fn spawn_refund_timer(&self) {
        let backend = self.backend.clone();
        let token = self.token.clone();
        let event_tx = self.event_tx.clone();
        let t1 = self.t1;

        tokio::spawn(async move {
            match backend.eth.wait_for_timestamp(&token, t1).await {
                Ok(_) => {
                    let _ = event_tx.send(Event::ShouldRefund).await;
                }
                Err(err) if err.is_canceled() => {}
                Err(err) => warn!(%err, "refund timer failed"),
            }
        });
    }

    /// The XMR lock reached its confirmations; permit the maker to claim.
    async fn handle_xmr_locked(&mut self, lock_height: u64) -> Result<(), SwapError> {
        info!(lock_height, "counterparty locked XMR");
        self.info.monero_start_height = lock_height.saturating_sub(1);
        self.set_status(Status::XmrLocked);

        let swap = self.contract_swap.clone().ok_or(SwapError::ContractNotSet)?;
        let tx_hash = self
            .backend
            .eth
            .set_ready(&self.token, self.backend.eth.swap_factory_addr(), &swap)
            .await?;
        info!(%tx_hash, "contract set ready");
        self.set_status(Status::ContractReady);
        Ok(())
    }

    /// The maker claimed, revealing their secret; sweep the joint account.
    async fn handle_claimed(&mut self, maker_secret: B256) -> Result<(), SwapError> {
        let maker_spend_key = spend_key_from_contract_secret(maker_secret)?;
        self.backend
            .recovery_db
            .put_counterparty_swap_private_key(&self.info.offer_id, &maker_spend_key)?;

        let maker_view_key = self
            .maker_private_view_key
            .clone()
            .ok_or(SwapError::MissingCounterpartyKeys)?;
        let joint = joint_private_key_pair(
            &maker_spend_key,
            self.keys.private_key_pair.spend_key(),
            &maker_view_key,
            self.keys.private_key_pair.view_key(),
        );

        let destination = self.backend.xmr.primary_address(&self.token).await?;
        let wallet_filename = format!("swap-claim-{:#x}", self.info.offer_id);
        let tx_hashes = self
            .backend
            .xmr
            .sweep_joint_account(
                &self.token,
                &joint,
                self.backend.env.monero_network,
                &wallet_filename,
                self.info.monero_start_height,
                destination,
            )
            .await?;
        info!(?tx_hashes, "swept XMR from the joint account");
        self.set_status(Status::CompletedSuccess);
        Ok(())
    }

    /// Timeout t1 elapsed with no claim; refund the locked ETH. The refund
    /// transaction reveals our secret, which is safe at this point.
    async fn handle_should_refund(&mut self) -> Result<(), SwapError> {
        let swap = self.contract_swap.clone().ok_or(SwapError::ContractNotSet)?;
        let secret = self.keys.contract_secret();
        let tx_hash = self
            .backend
            .eth
            .refund(
                &self.token,
                self.backend.eth.swap_factory_addr(),
                &swap,
                secret,
            )
            .await?;
        info!(%tx_hash, "refunded locked ETH");
        self.set_status(Status::CompletedRefund);
        Ok(())
    }

    async fn handle_exit(&mut self) -> anyhow::Result<()> {
        debug!(next_expected = %self.next_expected_event, "attempting to exit swap");

        let result: anyhow::Result<()> = if !self.eth_locked {
            self.set_status(Status::CompletedAbort);
            Ok(())
        } else if self.next_expected_event == EventType::XmrLocked {
            // No XMR was locked; reclaim our ETH right away.
            self.handle_should_refund().await.map_err(Into::into)
        } else if self.next_expected_event == EventType::Claimed {
            // The maker may claim at any moment; wait for the claim or the
            // refund window.
            info!("waiting for EventClaimed or EventShouldRefund");
            loop {
                let event = tokio::select! {
                    _ = self.token.cancelled() => break Err(SwapError::Canceled.into()),
                    event = self.event_rx.recv() => match event {
                        Some(event) => event,
                        None => break Err(SwapError::Canceled.into()),
                    },
                };
                match event {
                    Event::Claimed { log } => {
                        let Some(secret) = self.claimed_log_secret(&log) else {
                            continue;
                        };
                        break self.handle_claimed(secret).await.map_err(Into::into);
                    }
                    Event::ShouldRefund => {
                        break self.handle_should_refund().await.map_err(Into::into);
                    }
                    other => {
                        warn!(event = %other.event_type(), "ignoring event while exiting");
                    }
                }
            }
        } else {
            Ok(())
        };

        self.finalize();
        result
    }

    fn abort(&mut self) -> bool {
        self.set_status(Status::CompletedAbort);
        self.finalize();
        true
    }

    fn claimed_log_secret(&self, log: &Log) -> Option<B256> {
        let topics = log.inner.data.topics();
        if topics.len() != 3 {
            return None;
        }
        if topics[1] != self.contract_swap_id {
            debug!("ignoring Claimed log for a different swap");
            return None;
        }
        Some(topics[2])
    }

    fn set_status(&mut self, status: Status) {
        self.info.set_status(status);
        self.backend.swap_manager.update_ongoing_swap(&self.info);
        let record = OngoingOffer {
            offer: self.offer.clone(),
            status,
            monero_start_height: self.info.monero_start_height,
            extra: Default::default(),
        };
        if let Err(err) = self
            .backend
            .recovery_db
            .put_ongoing_offer(&self.info.offer_id, &record)
        {
            warn!(%err, "failed to persist swap status");
        }
    }

    fn finalize(&mut self) {
        self.next_expected_event = EventType::None;
        self.backend.swap_manager.complete_ongoing_swap(&self.info);

        if let Err(err) = self.backend.recovery_db.delete_swap(&self.info.offer_id) {
            warn!(%err, "failed to delete recovery records");
        }

        self.token.cancel();
        if let Some(done) = self.done_tx.take() {
            let _ = done.send(());
        }

        match self.info.status {
            Status::CompletedSuccess => {
                info!(swap = %self.info.offer_id, "**swap completed successfully**")
            }
            Status::CompletedRefund => {
                info!(swap = %self.info.offer_id, "**swap refunded successfully**")
            }
            Status::CompletedAbort => info!(swap = %self.info.offer_id, "**swap aborted**"),
            other => warn!(swap = %self.info.offer_id, status = %other, "swap exiting while ongoing"),
        }
    }
}

async fn forward_claimed_logs(
    token: CancellationToken,
    mut claimed_rx: mpsc::Receiver<Log>,
    event_tx: mpsc::Sender<Event>,
) {
    loop {
        let log = tokio::select! {
            _ = token.cancelled() => return,
            log = claimed_rx.recv() => match log {
                Some(log) => log,
                None => return,
            },
        };
        if event_tx.send(Event::Claimed { log }).await.is_err() {
            return;
        }
    }
}
