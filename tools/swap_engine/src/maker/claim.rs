use alloy::primitives::B256;
use tracing::{debug, info, warn};

use crate::amounts::wei_to_eth;
use crate::error::SwapError;

use super::MakerSwap;

impl MakerSwap {
    /// Redeems the ETH-side funds, revealing our secret on-chain. Uses the
    /// relayer path when configured to, or when we cannot pay for gas.
    pub(super) async fn claim_funds(&mut self) -> Result<B256, SwapError> {
        let contract = self.contract_address.ok_or(SwapError::ContractNotSet)?;
        let swap = self.contract_swap.clone().ok_or(SwapError::ContractNotSet)?;

        let balance = self.backend.eth.balance(&self.token).await?;
        info!(balance = %wei_to_eth(balance), "ETH balance before claim");

        let secret = self.contract_secret();
        let tx_hash = if self.offer_extra.use_relayer || balance.is_zero() {
            match self.relayed_claim(contract, &swap, secret).await {
                Ok(tx_hash) => tx_hash,
                Err(err) => {
                    warn!(%err, "failed to claim using relayers");
                    return Err(err);
                }
            }
        } else {
            self.backend
                .eth
                .claim(&self.token, contract, &swap, secret)
                .await?
        };

        info!(%tx_hash, "sent claim transaction");

        let balance = self.backend.eth.balance(&self.token).await?;
        info!(balance = %wei_to_eth(balance), "ETH balance after claim");
        Ok(tx_hash)
    }

    /// Discovers candidate relayers and tries them in order until one
    /// produces a validated claim receipt.
    async fn relayed_claim(
        &self,
        contract: alloy::primitives::Address,
        swap: &eth_escrow::SwapFactory::Swap,
        secret: B256,
    ) -> Result<B256, SwapError> {
        let relayers = self.backend.relayer_discovery.discover().await?;
        if relayers.is_empty() {
            return Err(eth_escrow::RelayerError::NoRelayerSucceeded.into());
        }
        debug!(count = relayers.len(), "found relayers to submit claim to");

        Ok(self
            .backend
            .eth
            .relayed_claim(
                &self.token,
                &relayers,
                contract,
                swap,
                secret,
                self.backend.options.fee_wei,
            )
            .await?)
    }
}
