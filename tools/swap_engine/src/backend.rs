use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use async_trait::async_trait;
use eth_escrow::{
    block::wait_for_eth_block_after_timestamp, CodeDigests, EthClient, EventFilter,
    RelayerClient, SwapFactory,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use xmr_wallet::monero::{self, Network};
use xmr_wallet::{Balance, PrivateKeyPair, SweepParams, TransferReceipt, XmrWallet};

use crate::config::EnvConfig;
use crate::db::RecoveryDb;
use crate::error::SwapError;
use crate::manager::SwapManager;
use crate::offers::OfferManager;

/// Ethereum operations the state machines depend on. `EthClient` implements
/// this against a live node; tests substitute their own chain.
#[async_trait]
pub trait EthOps: Send + Sync {
    fn address(&self) -> Address;
    fn swap_factory_addr(&self) -> Address;

    async fn balance(&self, token: &CancellationToken) -> Result<U256, SwapError>;
    async fn block_number(&self, token: &CancellationToken) -> Result<u64, SwapError>;

    async fn swap_stage(
        &self,
        token: &CancellationToken,
        contract: Address,
        swap_id: B256,
    ) -> Result<SwapFactory::Stage, SwapError>;

    /// Verifies deployed bytecode at `contract` (and its forwarder),
    /// returning the forwarder address.
    async fn check_contract_code(
        &self,
        token: &CancellationToken,
        contract: Address,
    ) -> Result<Address, SwapError>;

    #[allow(clippy::too_many_arguments)]
    async fn new_swap(
        &self,
        token: &CancellationToken,
        pub_key_claim: B256,
        pub_key_refund: B256,
        claimer: Address,
        timeout_duration: U256,
        asset: Address,
        value: U256,
        nonce: U256,
    ) -> Result<NewSwapReceipt, SwapError>;

    async fn set_ready(
        &self,
        token: &CancellationToken,
        contract: Address,
        swap: &SwapFactory::Swap,
    ) -> Result<B256, SwapError>;

    async fn claim(
        &self,
        token: &CancellationToken,
        contract: Address,
        swap: &SwapFactory::Swap,
        secret: B256,
    ) -> Result<B256, SwapError>;

    async fn refund(
        &self,
        token: &CancellationToken,
        contract: Address,
        swap: &SwapFactory::Swap,
        secret: B256,
    ) -> Result<B256, SwapError>;

    /// Builds, signs and submits a relayed claim through the given relayers,
    /// returning the hash of the first validated claim transaction.
    async fn relayed_claim(
        &self,
        token: &CancellationToken,
        relayers: &[Arc<dyn RelayerClient>],
        contract: Address,
        swap: &SwapFactory::Swap,
        secret: B256,
        fee_wei: U256,
    ) -> Result<B256, SwapError>;

    /// Waits for the first block at or past `ts`, returning its timestamp.
    async fn wait_for_timestamp(
        &self,
        token: &CancellationToken,
        ts: u64,
    ) -> Result<u64, SwapError>;

    /// Starts a log watcher delivering matches to `mailbox`.
    fn spawn_event_filter(
        &self,
        token: CancellationToken,
        contract: Address,
        from_block: u64,
        topic: B256,
        mailbox: mpsc::Sender<Log>,
    );
}

#[derive(Debug, Clone, Copy)]
pub struct NewSwapReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub block_timestamp: u64,
}

/// Monero operations the state machines depend on.
#[async_trait]
pub trait XmrOps: Send + Sync {
    async fn get_height(&self, token: &CancellationToken) -> Result<u64, SwapError>;
    async fn get_balance(&self, token: &CancellationToken, account: u32)
        -> Result<Balance, SwapError>;
    async fn primary_address(&self, token: &CancellationToken)
        -> Result<monero::Address, SwapError>;

    async fn transfer(
        &self,
        token: &CancellationToken,
        destination: &monero::Address,
        account: u32,
        amount_piconero: u64,
        min_confirmations: u64,
    ) -> Result<TransferReceipt, SwapError>;

    /// Imports the joint keypair and sweeps its balance to `destination`.
    async fn sweep_joint_account(
        &self,
        token: &CancellationToken,
        keypair: &PrivateKeyPair,
        network: Network,
        wallet_filename: &str,
        restore_height: u64,
        destination: monero::Address,
    ) -> Result<Vec<String>, SwapError>;

    async fn wait_for_blocks(&self, token: &CancellationToken, count: u64)
        -> Result<u64, SwapError>;

    /// Watches an address for an incoming transfer of at least
    /// `amount_piconero`, resolving with the lock height once it has
    /// `min_confirmations` confirmations.
    async fn watch_for_lock(
        &self,
        token: &CancellationToken,
        address: &monero::Address,
        amount_piconero: u64,
        min_confirmations: u64,
    ) -> Result<u64, SwapError>;
}

/// Finds candidate relayers willing to submit a claim for us.
#[async_trait]
pub trait RelayerDiscovery: Send + Sync {
    async fn discover(&self) -> anyhow::Result<Vec<Arc<dyn RelayerClient>>>;
}

/// Node-level options recognized by the engine core.
#[derive(Debug, Clone, Copy)]
pub struct SwapOptions {
    /// Relayer fee deducted at claim; must be strictly below the swap value.
    pub fee_wei: U256,
    /// Whether this node advertises as a relayer and validates inbound
    /// claim requests.
    pub is_relayer: bool,
}

impl Default for SwapOptions {
    fn default() -> Self {
        Self {
            // 0.009 ETH
            fee_wei: U256::from(9_000_000_000_000_000u64),
            is_relayer: false,
        }
    }
}

/// Shared, non-owning handle bundle behind every swap. Swaps reference the
/// backend; it never references them back.
pub struct Backend {
    pub env: EnvConfig,
    pub options: SwapOptions,
    pub eth: Arc<dyn EthOps>,
    pub xmr: Arc<dyn XmrOps>,
    pub recovery_db: Arc<RecoveryDb>,
    pub swap_manager: Arc<SwapManager>,
    pub offers: Arc<OfferManager>,
    pub relayer_discovery: Arc<dyn RelayerDiscovery>,
    /// Root token; per-swap tokens are children of it so node shutdown
    /// cancels everything.
    pub shutdown: CancellationToken,
}

impl Backend {
    pub fn new_swap_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

async fn race<T, E>(
    token: &CancellationToken,
    fut: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, SwapError>
where
    SwapError: From<E>,
{
    tokio::select! {
        _ = token.cancelled() => Err(SwapError::Canceled),
        result = fut => Ok(result?),
    }
}

#[async_trait]
impl EthOps for EthClient {
    fn address(&self) -> Address {
        EthClient::address(self)
    }

    fn swap_factory_addr(&self) -> Address {
        EthClient::swap_factory_addr(self)
    }

    async fn balance(&self, token: &CancellationToken) -> Result<U256, SwapError> {
        race(token, EthClient::balance(self)).await
    }

    async fn block_number(&self, token: &CancellationToken) -> Result<u64, SwapError> {
        race(token, EthClient::block_number(self)).await
    }

    async fn swap_stage(
        &self,
        token: &CancellationToken,
        contract: Address,
        swap_id: B256,
    ) -> Result<SwapFactory::Stage, SwapError> {
        race(token, EthClient::swap_stage(self, contract, swap_id)).await
    }

    async fn check_contract_code(
        &self,
        token: &CancellationToken,
        contract: Address,
    ) -> Result<Address, SwapError> {
        Ok(eth_escrow::check_swap_factory_contract_code(
            token,
            self.provider(),
            contract,
            &CodeDigests::default(),
        )
        .await?)
    }

    async fn new_swap(
        &self,
        token: &CancellationToken,
        pub_key_claim: B256,
        pub_key_refund: B256,
        claimer: Address,
        timeout_duration: U256,
        asset: Address,
        value: U256,
        nonce: U256,
    ) -> Result<NewSwapReceipt, SwapError> {
        let receipt = race(
            token,
            EthClient::new_swap(
                self,
                pub_key_claim,
                pub_key_refund,
                claimer,
                timeout_duration,
                asset,
                value,
                nonce,
            ),
        )
        .await?;

        let block_number = receipt
            .block_number
            .ok_or(eth_escrow::EthError::TxFailed(receipt.transaction_hash))?;
        let provider = self.provider();
        let block = race(token, async move {
            alloy::providers::Provider::get_block_by_number(provider, block_number.into())
                .await
                .map_err(eth_escrow::EthError::from)
        })
        .await?
        .ok_or(eth_escrow::EthError::TxFailed(receipt.transaction_hash))?;

        Ok(NewSwapReceipt {
            tx_hash: receipt.transaction_hash,
            block_number,
            block_timestamp: block.header.timestamp,
        })
    }

    async fn set_ready(
        &self,
        token: &CancellationToken,
        contract: Address,
        swap: &SwapFactory::Swap,
    ) -> Result<B256, SwapError> {
        let receipt = race(token, EthClient::set_ready(self, contract, swap)).await?;
        Ok(receipt.transaction_hash)
    }

    async fn claim(
        &self,
        token: &CancellationToken,
        contract: Address,
        swap: &SwapFactory::Swap,
        secret: B256,
    ) -> Result<B256, SwapError> {
        let receipt = race(token, EthClient::claim(self, contract, swap, secret)).await?;
        Ok(receipt.transaction_hash)
    }

    async fn refund(
        &self,
        token: &CancellationToken,
        contract: Address,
        swap: &SwapFactory::Swap,
        secret: B256,
    ) -> Result<B256, SwapError> {
        let receipt = race(token, EthClient::refund(self, contract, swap, secret)).await?;
        Ok(receipt.transaction_hash)
    }

    async fn relayed_claim(
        &self,
        token: &CancellationToken,
        relayers: &[Arc<dyn RelayerClient>],
        contract: Address,
        swap: &SwapFactory::Swap,
        secret: B256,
        fee_wei: U256,
    ) -> Result<B256, SwapError> {
        let forwarder = race(token, EthClient::trusted_forwarder(self, contract)).await?;
        let request = eth_escrow::create_relay_claim_request(
            token,
            self.signer(),
            self.provider(),
            contract,
            forwarder,
            swap,
            &secret,
            fee_wei,
        )
        .await?;
        Ok(eth_escrow::submit_to_relayers(
            token,
            self.provider(),
            relayers,
            &request,
            contract,
            secret,
        )
        .await?)
    }

    async fn wait_for_timestamp(
        &self,
        token: &CancellationToken,
        ts: u64,
    ) -> Result<u64, SwapError> {
        let header = wait_for_eth_block_after_timestamp(token, self.provider(), ts).await?;
        Ok(header.timestamp)
    }

    fn spawn_event_filter(
        &self,
        token: CancellationToken,
        contract: Address,
        from_block: u64,
        topic: B256,
        mailbox: mpsc::Sender<Log>,
    ) {
        EventFilter::new(token, self.provider().clone(), contract, from_block, topic, mailbox)
            .start();
    }
}

/// Production `XmrOps` over the wallet RPC.
pub struct MoneroBackend {
    wallet: XmrWallet,
    block_sleep: Duration,
    /// Wallet file to reopen after a joint-account sweep.
    primary_wallet_file: Option<String>,
}

impl MoneroBackend {
    pub fn new(wallet: XmrWallet, env: &EnvConfig, primary_wallet_file: Option<String>) -> Self {
        Self {
            wallet,
            block_sleep: env.block_sleep,
            primary_wallet_file,
        }
    }
}

#[async_trait]
impl XmrOps for MoneroBackend {
    async fn get_height(&self, token: &CancellationToken) -> Result<u64, SwapError> {
        Ok(self.wallet.get_height(token).await?)
    }

    async fn get_balance(
        &self,
        token: &CancellationToken,
        account: u32,
    ) -> Result<Balance, SwapError> {
        Ok(self.wallet.get_balance(token, account).await?)
    }

    async fn primary_address(
        &self,
        token: &CancellationToken,
    ) -> Result<monero::Address, SwapError> {
        Ok(self.wallet.primary_address(token).await?)
    }

    async fn transfer(
        &self,
        token: &CancellationToken,
        destination: &monero::Address,
        account: u32,
        amount_piconero: u64,
        min_confirmations: u64,
    ) -> Result<TransferReceipt, SwapError> {
        Ok(self
            .wallet
            .transfer(token, destination, account, amount_piconero, min_confirmations)
            .await?)
    }

    async fn sweep_joint_account(
        &self,
        token: &CancellationToken,
        keypair: &PrivateKeyPair,
        network: Network,
        wallet_filename: &str,
        restore_height: u64,
        destination: monero::Address,
    ) -> Result<Vec<String>, SwapError> {
        let params = SweepParams {
            keypair,
            network,
            wallet_filename: wallet_filename.to_string(),
            restore_height,
            destination,
            reopen_wallet: self.primary_wallet_file.clone(),
        };
        Ok(xmr_wallet::sweep_joint_account(token, &self.wallet, &params).await?)
    }

    async fn wait_for_blocks(
        &self,
        token: &CancellationToken,
        count: u64,
    ) -> Result<u64, SwapError> {
        Ok(xmr_wallet::wait_for_blocks(token, &self.wallet, count, self.block_sleep).await?)
    }

    async fn watch_for_lock(
        &self,
        token: &CancellationToken,
        address: &monero::Address,
        amount_piconero: u64,
        min_confirmations: u64,
    ) -> Result<u64, SwapError> {
        let mut watcher = xmr_wallet::LockWatcher::new(xmr_wallet::WatcherConfig {
            confirmations_required: min_confirmations,
            ..Default::default()
        });
        loop {
            if let Some(event) = watcher
                .poll_for_lock(token, &self.wallet, address, amount_piconero)
                .await?
            {
                if let xmr_wallet::WatcherEvent::Confirmed {
                    observed_height, ..
                } = event
                {
                    return Ok(observed_height);
                }
            }
            tokio::select! {
                _ = token.cancelled() => return Err(SwapError::Canceled),
                _ = tokio::time::sleep(self.block_sleep) => {}
            }
        }
    }
}
