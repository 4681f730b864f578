//! Maker-side swap state machine: we offer XMR and receive the ETH-side
//! asset. One instance drives a single swap from key exchange to a terminal
//! status, consuming events from the peer, the chain watchers and callers.

mod claim;
mod event_loop;
mod verify;

use std::sync::Arc;

use alloy::primitives::{Address, B256};
use alloy::rpc::types::Log;
use dleq::Secp256k1PublicKey;
use eth_escrow::SwapFactory;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xmr_wallet::{
    joint_private_key_pair, sum_spend_and_view_keys, PrivateKeyPair, PrivateSpendKey,
    PrivateViewKey, PublicKey, PublicKeyPair,
};

use crate::amounts::xmr_to_piconero;
use crate::backend::Backend;
use crate::db::{CounterpartyKeys, EthereumSwapInfo, OngoingOffer};
use crate::error::SwapError;
use crate::event::{next_expected_event_from_status, Event, EventType};
use crate::keys::{generate_keys_and_proof, verify_keys_and_proof, KeysAndProof};
use crate::message::{Message, NotifyEthLocked, SendKeysMessage};
use crate::offers::{Offer, OfferExtra};
use crate::types::{Hash, ProvidesCoin, Status, StatusSender, SwapInfo};

const EVENT_CHANNEL_SIZE: usize = 16;
const LOG_CHANNEL_SIZE: usize = 16;

/// Caller-facing handle to a running maker swap.
pub struct SwapHandle {
    pub offer_id: Hash,
    event_tx: mpsc::Sender<Event>,
    token: CancellationToken,
    done_rx: oneshot::Receiver<()>,
}

impl SwapHandle {
    /// Forwards the taker's `NotifyETHLocked` message and waits for the
    /// handler's verdict.
    pub async fn notify_eth_locked(&self, message: NotifyEthLocked) -> anyhow::Result<()> {
        let (ack, response) = oneshot::channel();
        self.event_tx
            .send(Event::EthLocked { message, ack })
            .await
            .map_err(|_| anyhow::anyhow!("swap event loop has shut down"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("swap event loop dropped the event"))?
    }

    /// Requests an orderly exit: refund if necessary, abort if nothing was
    /// locked yet.
    pub async fn exit(&self) -> anyhow::Result<()> {
        let (ack, response) = oneshot::channel();
        if self
            .event_tx
            .send(Event::Exit { ack })
            .await
            .is_err()
        {
            // Event loop already gone; the swap has terminated.
            return Ok(());
        }
        match response.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }

    /// Resolves when the swap reaches a terminal status.
    pub async fn done(self) {
        let _ = self.done_rx.await;
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Per-swap state. All fields are owned by the event-handler task; nothing
/// outside it reads or writes swap-local state.
pub struct MakerSwap {
    backend: Arc<Backend>,
    token: CancellationToken,

    pub(super) info: SwapInfo,
    offer: Offer,
    offer_extra: OfferExtra,
    eth_start_block: u64,

    /// Session keys; `None` when resumed from the recovery DB, where only
    /// the spend key survives.
    keys: Option<KeysAndProof>,
    privkeys: PrivateKeyPair,
    pubkeys: PublicKeyPair,

    contract_address: Option<Address>,
    contract_swap: Option<SwapFactory::Swap>,
    contract_swap_id: Hash,
    t0: u64,
    t1: u64,

    taker_public_spend_key: Option<PublicKey>,
    taker_private_view_key: Option<PrivateViewKey>,
    taker_secp256k1_public_key: Option<Secp256k1PublicKey>,

    next_expected_event: EventType,
    watchers_started: bool,

    event_rx: mpsc::Receiver<Event>,
    ready_tx: mpsc::Sender<Log>,
    refunded_tx: mpsc::Sender<Log>,
    done_tx: Option<oneshot::Sender<()>>,
}

impl MakerSwap {
    /// Starts a fresh swap from the taker's opening `SendKeysMessage`.
    /// Returns the running state, a caller handle, the status stream, and
    /// the `SendKeysMessage` to reply with.
    pub async fn new_from_start(
        backend: Arc<Backend>,
        offer: Offer,
        offer_extra: OfferExtra,
        taker_keys: &SendKeysMessage,
    ) -> Result<
        (
            MakerSwap,
            SwapHandle,
            mpsc::UnboundedReceiver<Status>,
            Message,
        ),
        SwapError,
    > {
        let token = backend.new_swap_token();

        // The taker provides the ETH side; we provide the XMR equivalent.
        let expected_amount = taker_keys.provided_amount.clone();
        let provided_amount = offer.exchange_rate.to_xmr_amount(&expected_amount);
        if !offer.contains_amount(&provided_amount) {
            return Err(SwapError::AmountOutOfRange);
        }

        let taker_verified = verify_keys_and_proof(
            &taker_keys.dleq_proof,
            &taker_keys.secp256k1_public_key,
            &taker_keys.public_spend_key,
        )?;

        if offer_extra.use_relayer {
            backend.recovery_db.put_relayer_info(&offer.id, &offer_extra)?;
        }

        let mut monero_start_height = backend.xmr.get_height(&token).await?;
        // Scan a little below the tip in case of a reorg.
        if monero_start_height >= backend.env.min_spend_confirmations {
            monero_start_height -= backend.env.min_spend_confirmations;
        }
        let eth_start_block = backend.eth.block_number(&token).await?;

        let (status_sender, status_rx) = StatusSender::channel();
        let mut info = SwapInfo::new(
            offer.id,
            ProvidesCoin::Xmr,
            provided_amount,
            expected_amount,
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
        backend.recovery_db.put_counterparty_swap_keys(
            &offer.id,
            &CounterpartyKeys {
                public_spend_key: taker_verified.public_spend_key,
                private_view_key: taker_keys.private_view_key.clone(),
            },
        )?;
        backend.recovery_db.put_ongoing_offer(
            &offer.id,
            &OngoingOffer {
                offer: offer.clone(),
                status: Status::KeysExchanged,
                monero_start_height,
                extra: offer_extra,
            },
        )?;

        info.set_status(Status::KeysExchanged);

        let reply = Message::SendKeys(SendKeysMessage {
            offer_id: None,
            provided_amount: info.provided_amount.clone(),
            public_spend_key: *keys.public_key_pair.spend_key(),
            private_view_key: keys.private_key_pair.view_key().clone(),
            dleq_proof: keys.dleq_proof.to_bytes().to_vec(),
            secp256k1_public_key: keys.secp256k1_public.clone(),
            eth_address: Some(backend.eth.address()),
        });

        let privkeys = keys.private_key_pair.clone();
        let pubkeys = keys.public_key_pair;
        let (mut swap, handle) = Self::build(
            backend,
            token,
            info,
            offer,
            offer_extra,
            eth_start_block,
            privkeys,
            pubkeys,
            EventType::EthLocked,
        );
        // Watch the canonical factory from the start; a Ready log arriving
        // before the lock notification is a protocol-order violation.
        swap.start_watchers(swap.backend.eth.swap_factory_addr());
        swap.keys = Some(keys);
        swap.taker_public_spend_key = Some(taker_verified.public_spend_key);
        swap.taker_private_view_key = Some(taker_keys.private_view_key.clone());
        swap.taker_secp256k1_public_key = Some(taker_verified.secp256k1_public);

        Ok((swap, handle, status_rx, reply))
    }

    /// Resumes a swap that already locked XMR before a crash. Watchers are
    /// re-attached at the recorded contract address and start block.
    pub fn new_from_ongoing(
        backend: Arc<Backend>,
        ongoing: OngoingOffer,
        eth_info: EthereumSwapInfo,
        spend_key: PrivateSpendKey,
    ) -> Result<(MakerSwap, SwapHandle, mpsc::UnboundedReceiver<Status>), SwapError> {
        if !matches!(ongoing.status, Status::XmrLocked | Status::ContractReady) {
            return Err(SwapError::InvalidStageForRecovery(ongoing.status));
        }
        debug!(start_block = eth_info.start_block, "restarting swap from recovery record");

        let token = backend.new_swap_token();
        let offer = ongoing.offer;
        // The agreed amounts are pinned by the contract swap value.
        let expected_amount = crate::amounts::wei_to_eth(eth_info.swap.value);
        let provided_amount = offer.exchange_rate.to_xmr_amount(&expected_amount);

        let (status_sender, status_rx) = StatusSender::channel();
        let info = SwapInfo::new(
            offer.id,
            ProvidesCoin::Xmr,
            provided_amount,
            expected_amount,
            offer.exchange_rate.clone(),
            offer.eth_asset,
            ongoing.status,
            ongoing.monero_start_height,
            status_sender,
        );
        backend.swap_manager.add_swap(&info)?;

        let privkeys = PrivateKeyPair::from_spend_key(spend_key);
        let pubkeys = privkeys.public_key_pair();
        let next_expected = next_expected_event_from_status(ongoing.status);

        let (mut swap, handle) = Self::build(
            backend,
            token,
            info,
            offer,
            ongoing.extra,
            eth_info.start_block,
            privkeys,
            pubkeys,
            next_expected,
        );
        swap.contract_address = Some(eth_info.contract_address);
        swap.contract_swap_id = eth_info.swap_id;
        swap.t0 = u64::try_from(eth_info.swap.timeout0).map_err(|_| SwapError::InvalidTimeouts)?;
        swap.t1 = u64::try_from(eth_info.swap.timeout1).map_err(|_| SwapError::InvalidTimeouts)?;
        swap.contract_swap = Some(eth_info.swap);
        swap.start_watchers(eth_info.contract_address);

        Ok((swap, handle, status_rx))
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        backend: Arc<Backend>,
        token: CancellationToken,
        info: SwapInfo,
        offer: Offer,
        offer_extra: OfferExtra,
        eth_start_block: u64,
        privkeys: PrivateKeyPair,
        pubkeys: PublicKeyPair,
        next_expected_event: EventType,
    ) -> (MakerSwap, SwapHandle) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (ready_tx, ready_rx) = mpsc::channel(LOG_CHANNEL_SIZE);
        let (refunded_tx, refunded_rx) = mpsc::channel(LOG_CHANNEL_SIZE);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(event_loop::forward_logs(
            token.clone(),
            ready_rx,
            refunded_rx,
            event_tx.clone(),
        ));

        let handle = SwapHandle {
            offer_id: info.offer_id,
            event_tx,
            token: token.clone(),
            done_rx,
        };

        let swap = MakerSwap {
            backend,
            token,
            info,
            offer,
            offer_extra,
            eth_start_block,
            keys: None,
            privkeys,
            pubkeys,
            contract_address: None,
            contract_swap: None,
            contract_swap_id: Hash::ZERO,
            t0: 0,
            t1: 0,
            taker_public_spend_key: None,
            taker_private_view_key: None,
            taker_secp256k1_public_key: None,
            next_expected_event,
            watchers_started: false,
            event_rx,
            ready_tx,
            refunded_tx,
            done_tx: Some(done_tx),
        };

        (swap, handle)
    }

    pub fn offer_id(&self) -> Hash {
        self.info.offer_id
    }

    /// The secret in its contract-side (byte-reversed) form.
    pub(super) fn contract_secret(&self) -> B256 {
        let mut bytes = self.privkeys.spend_key().to_bytes();
        bytes.reverse();
        B256::from(bytes)
    }

    fn start_watchers(&mut self, contract: Address) {
        if self.watchers_started {
            return;
        }
        self.watchers_started = true;
        self.backend.eth.spawn_event_filter(
            self.token.clone(),
            contract,
            self.eth_start_block,
            eth_escrow::ready_topic(),
            self.ready_tx.clone(),
        );
        self.backend.eth.spawn_event_filter(
            self.token.clone(),
            contract,
            self.eth_start_block,
            eth_escrow::refunded_topic(),
            self.refunded_tx.clone(),
        );
    }

    /// Updates the status everywhere: status channel, manager index and the
    /// durable offer record.
    pub(super) fn set_status(&mut self, status: Status) {
        self.info.set_status(status);
        self.backend.swap_manager.update_ongoing_swap(&self.info);
        let record = OngoingOffer {
            offer: self.offer.clone(),
            status,
            monero_start_height: self.info.monero_start_height,
            extra: self.offer_extra,
        };
        if let Err(err) = self
            .backend
            .recovery_db
            .put_ongoing_offer(&self.info.offer_id, &record)
        {
            warn!(%err, "failed to persist swap status");
        }
    }

    /// Handles the taker's verified ETH-lock notification: checkpoint, then
    /// lock our XMR into the joint account.
    pub(super) async fn handle_eth_locked(
        &mut self,
        message: NotifyEthLocked,
    ) -> Result<(), SwapError> {
        let verified = self.verify_notify_eth_locked(&message).await?;

        self.contract_address = Some(verified.contract_address);
        self.contract_swap_id = verified.swap_id;
        self.t0 = verified.t0;
        self.t1 = verified.t1;
        self.contract_swap = Some(verified.swap.clone());
        debug!(
            swap_id = %self.contract_swap_id,
            t0 = self.t0,
            t1 = self.t1,
            "verified locked contract"
        );
        self.info.set_status(Status::EthLocked);
        self.backend.swap_manager.update_ongoing_swap(&self.info);

        // Checkpoint everything needed to claim or reclaim before the
        // irreversible XMR transfer goes out.
        let eth_info = EthereumSwapInfo {
            start_block: self.eth_start_block,
            swap_id: verified.swap_id,
            swap: verified.swap,
            contract_address: verified.contract_address,
        };
        self.backend
            .recovery_db
            .put_ethereum_swap_info(&self.info.offer_id, &eth_info)?;
        self.backend.recovery_db.put_ongoing_offer(
            &self.info.offer_id,
            &OngoingOffer {
                offer: self.offer.clone(),
                status: Status::XmrLocked,
                monero_start_height: self.info.monero_start_height,
                extra: self.offer_extra,
            },
        )?;

        // A verified foreign factory needs its own watcher pair.
        if verified.contract_address != self.backend.eth.swap_factory_addr() {
            self.watchers_started = false;
            self.start_watchers(verified.contract_address);
        }

        let amount = xmr_to_piconero(&self.info.provided_amount)?;
        self.lock_funds(amount).await?;
        self.set_status(Status::XmrLocked);
        Ok(())
    }

    /// Locks our XMR in the joint account (S_a + S_b, viewable with
    /// V_a + V_b), waiting for the configured confirmations.
    async fn lock_funds(&mut self, amount_piconero: u64) -> Result<(), SwapError> {
        let taker_spend = self
            .taker_public_spend_key
            .ok_or(SwapError::MissingCounterpartyKeys)?;
        let taker_view = self
            .taker_private_view_key
            .clone()
            .ok_or(SwapError::MissingCounterpartyKeys)?;

        let taker_pubs = PublicKeyPair::new(taker_spend, taker_view.public());
        let joint = sum_spend_and_view_keys(&taker_pubs, &self.pubkeys);
        let destination = joint.address(self.backend.env.monero_network)?;

        let balance = self.backend.xmr.get_balance(&self.token, 0).await?;
        debug!(
            total = balance.balance,
            unlocked = balance.unlocked_balance,
            "XMR balance before lock"
        );

        info!(
            amount = %self.info.provided_amount,
            %destination,
            "locking XMR funds"
        );
        let receipt = self
            .backend
            .xmr
            .transfer(
                &self.token,
                &destination,
                0,
                amount_piconero,
                self.backend.env.min_spend_confirmations,
            )
            .await?;
        info!(
            tx_hash = %receipt.tx_hash,
            height = receipt.height,
            "successfully locked XMR funds"
        );
        Ok(())
    }

    /// The taker refunded on-chain, revealing their secret; reclaim the
    /// locked XMR from the joint account.
    pub(super) async fn handle_eth_refunded(&mut self, taker_secret: B256) -> Result<(), SwapError> {
        let taker_spend_key = crate::keys::spend_key_from_contract_secret(taker_secret)?;

        // Persist the counterparty key first, in case the sweep fails.
        self.backend
            .recovery_db
            .put_counterparty_swap_private_key(&self.info.offer_id, &taker_spend_key)?;

        if self.taker_private_view_key.is_none() {
            let keys = self
                .backend
                .recovery_db
                .get_counterparty_swap_keys(&self.info.offer_id)?
                .ok_or(SwapError::MissingCounterpartyKeys)?;
            self.taker_public_spend_key = Some(keys.public_spend_key);
            self.taker_private_view_key = Some(keys.private_view_key);
        }
        let taker_view_key = self
            .taker_private_view_key
            .clone()
            .ok_or(SwapError::MissingCounterpartyKeys)?;

        let joint = joint_private_key_pair(
            &taker_spend_key,
            self.privkeys.spend_key(),
            &taker_view_key,
            self.privkeys.view_key(),
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
        info!(?tx_hashes, "reclaimed XMR after counterparty refund");

        self.set_status(Status::CompletedRefund);
        Ok(())
    }

    /// Terminal cleanup: manager bookkeeping, offer re-add or delete,
    /// recovery-record deletion, cancellation, and the single done signal.
    pub(super) fn finalize(&mut self) {
        self.next_expected_event = EventType::None;
        self.backend.swap_manager.complete_ongoing_swap(&self.info);

        if self.info.status == Status::CompletedSuccess {
            self.backend.offers.delete_offer(&self.offer.id);
        } else if self.offer.is_set() {
            // The offer wasn't taken successfully; advertise it again.
            if let Err(err) = self
                .backend
                .offers
                .add_offer(self.offer.clone(), self.offer_extra)
            {
                warn!(%err, "failed to re-add offer");
            } else {
                debug!(offer = %self.offer.id, "re-added offer");
            }
        }

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
