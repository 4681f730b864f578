use alloy::network::EthereumWallet;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionReceipt;
use alloy::signers::local::PrivateKeySigner;
use tracing::{debug, info};

use crate::contract::SwapFactory;
use crate::error::EthError;

/// Shared Ethereum client: one provider and signing key, used by every swap.
///
/// The provider is cheap to clone and thread-safe; per-swap cancellation is
/// handled by the callers, which race RPC futures against their tokens.
pub struct EthClient {
    provider: DynProvider,
    signer: PrivateKeySigner,
    address: Address,
    swap_factory: Address,
}

impl EthClient {
    pub async fn connect(
        url: &str,
        signer: PrivateKeySigner,
        swap_factory: Address,
    ) -> Result<Self, EthError> {
        debug!(rpc_url = url, "Connecting to Ethereum RPC");
        let wallet = EthereumWallet::from(signer.clone());
        let provider = ProviderBuilder::new().wallet(wallet).connect(url).await?.erased();
        Ok(Self::from_provider(provider, signer, swap_factory))
    }

    pub fn from_provider(
        provider: DynProvider,
        signer: PrivateKeySigner,
        swap_factory: Address,
    ) -> Self {
        let address = signer.address();
        Self {
            provider,
            signer,
            address,
            swap_factory,
        }
    }

    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// Our account address (the swap claimer on the maker side).
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn swap_factory_addr(&self) -> Address {
        self.swap_factory
    }

    fn factory_at(&self, contract: Address) -> SwapFactory::SwapFactoryInstance<DynProvider> {
        SwapFactory::new(contract, self.provider.clone())
    }

    pub async fn chain_id(&self) -> Result<u64, EthError> {
        Ok(self.provider.get_chain_id().await?)
    }

    pub async fn balance(&self) -> Result<U256, EthError> {
        Ok(self.provider.get_balance(self.address).await?)
    }

    pub async fn block_number(&self) -> Result<u64, EthError> {
        Ok(self.provider.get_block_number().await?)
    }

    pub async fn get_code(&self, addr: Address) -> Result<Bytes, EthError> {
        Ok(self.provider.get_code_at(addr).await?)
    }

    /// Current stage of a swap in the escrow contract at `contract`.
    pub async fn swap_stage(
        &self,
        contract: Address,
        swap_id: B256,
    ) -> Result<SwapFactory::Stage, EthError> {
        Ok(self.factory_at(contract).swaps(swap_id).call().await?)
    }

    pub async fn trusted_forwarder(&self, contract: Address) -> Result<Address, EthError> {
        Ok(self.factory_at(contract).trustedForwarder().call().await?)
    }

    /// Locks the ETH-side asset, creating the swap in the escrow contract.
    #[allow(clippy::too_many_arguments)]
    pub async fn new_swap(
        &self,
        pub_key_claim: B256,
        pub_key_refund: B256,
        claimer: Address,
        timeout_duration: U256,
        asset: Address,
        value: U256,
        nonce: U256,
    ) -> Result<TransactionReceipt, EthError> {
        let factory = self.factory_at(self.swap_factory);
        let mut call = factory.newSwap(
            pub_key_claim,
            pub_key_refund,
            claimer,
            timeout_duration,
            asset,
            value,
            nonce,
        );
        if asset == Address::ZERO {
            call = call.value(value);
        }
        let receipt = call.send().await?.get_receipt().await?;
        self.ensure_success(receipt)
    }

    pub async fn set_ready(
        &self,
        contract: Address,
        swap: &SwapFactory::Swap,
    ) -> Result<TransactionReceipt, EthError> {
        let receipt = self
            .factory_at(contract)
            .setReady(swap.clone())
            .send()
            .await?
            .get_receipt()
            .await?;
        self.ensure_success(receipt)
    }

    /// Claims the locked asset, revealing the secret on-chain.
    pub async fn claim(
        &self,
        contract: Address,
        swap: &SwapFactory::Swap,
        secret: B256,
    ) -> Result<TransactionReceipt, EthError> {
        let receipt = self
            .factory_at(contract)
            .claim(swap.clone(), secret)
            .send()
            .await?
            .get_receipt()
            .await?;
        info!(tx_hash = %receipt.transaction_hash, "Claim transaction mined");
        self.ensure_success(receipt)
    }

    pub async fn refund(
        &self,
        contract: Address,
        swap: &SwapFactory::Swap,
        secret: B256,
    ) -> Result<TransactionReceipt, EthError> {
        let receipt = self
            .factory_at(contract)
            .refund(swap.clone(), secret)
            .send()
            .await?
            .get_receipt()
            .await?;
        info!(tx_hash = %receipt.transaction_hash, "Refund transaction mined");
        self.ensure_success(receipt)
    }

    fn ensure_success(&self, receipt: TransactionReceipt) -> Result<TransactionReceipt, EthError> {
        if !receipt.status() {
            return Err(EthError::TxFailed(receipt.transaction_hash));
        }
        Ok(receipt)
    }
}
