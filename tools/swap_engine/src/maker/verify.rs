use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::Address;
use eth_escrow::SwapFactory;
use tracing::debug;

use crate::amounts::eth_to_wei;
use crate::error::SwapError;
use crate::message::NotifyEthLocked;
use crate::types::Hash;

use super::MakerSwap;

pub(super) struct VerifiedContract {
    pub swap: SwapFactory::Swap,
    pub swap_id: Hash,
    pub contract_address: Address,
    pub t0: u64,
    pub t1: u64,
}

impl MakerSwap {
    /// Verifies the taker's lock notification before we commit our XMR:
    /// the swap ID must match the struct, we must be the claimer, the value
    /// and asset must match the agreement, the timeouts must leave room for
    /// the XMR lock to confirm, the contract bytecode must be the known
    /// build, and the swap must be pending on-chain.
    pub(super) async fn verify_notify_eth_locked(
        &self,
        message: &NotifyEthLocked,
    ) -> Result<VerifiedContract, SwapError> {
        let swap = message.contract_swap.clone();

        let swap_id = eth_escrow::swap_id(&swap);
        if swap_id != message.contract_swap_id {
            return Err(SwapError::SwapIdMismatch);
        }

        if swap.claimer != self.backend.eth.address() {
            return Err(SwapError::InvalidClaimer);
        }

        let expected_value = eth_to_wei(&self.info.expected_amount)?;
        if swap.value != expected_value {
            return Err(SwapError::ValueMismatch {
                got: swap.value,
                want: expected_value,
            });
        }

        if swap.asset != self.offer.eth_asset.address() {
            return Err(SwapError::AssetMismatch);
        }

        // The contract's key commitments must bind the exchanged session
        // keys: the claim key is ours, the refund key is the taker's.
        if let Some(keys) = &self.keys {
            if swap.pubKeyClaim != crate::keys::secp256k1_commitment(&keys.secp256k1_public) {
                return Err(SwapError::CommitmentMismatch);
            }
        }
        if let Some(taker_key) = &self.taker_secp256k1_public_key {
            if swap.pubKeyRefund != crate::keys::secp256k1_commitment(taker_key) {
                return Err(SwapError::CommitmentMismatch);
            }
        }

        let t0 = u64::try_from(swap.timeout0).map_err(|_| SwapError::InvalidTimeouts)?;
        let t1 = u64::try_from(swap.timeout1).map_err(|_| SwapError::InvalidTimeouts)?;
        if t0 >= t1 {
            return Err(SwapError::InvalidTimeouts);
        }

        // t0 must be far enough out for the XMR lock to reach its required
        // confirmations.
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        let lock_window = self.backend.env.min_spend_confirmations
            * self.backend.env.monero_block_time.as_secs();
        if t0 < now + lock_window {
            return Err(SwapError::TimeoutTooSoon);
        }

        if message.address != self.backend.eth.swap_factory_addr() {
            debug!(address = %message.address, "verifying bytecode of unfamiliar swap factory");
            self.backend
                .eth
                .check_contract_code(&self.token, message.address)
                .await?;
        }

        let stage = self
            .backend
            .eth
            .swap_stage(&self.token, message.address, swap_id)
            .await?;
        if stage != SwapFactory::Stage::PENDING {
            return Err(SwapError::SwapNotPending(swap_id));
        }

        Ok(VerifiedContract {
            swap,
            swap_id,
            contract_address: message.address,
            t0,
            t1,
        })
    }
}
