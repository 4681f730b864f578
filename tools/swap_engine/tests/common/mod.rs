#![allow(dead_code)]

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use alloy::primitives::{address, Address, Bytes, LogData, B256, U256};
use alloy::rpc::types::Log;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use eth_escrow::{RelayerClient, SwapFactory};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use xmr_wallet::monero;
use xmr_wallet::{Balance, PrivateKeyPair, TransferReceipt};

use swap_engine::amounts::ExchangeRate;
use swap_engine::backend::NewSwapReceipt;
use swap_engine::{
    Backend, Env, EnvConfig, EthAsset, EthOps, Offer, OfferManager, ProvidesCoin,
    RelayerDiscovery, RecoveryDb, SwapError, SwapManager, SwapOptions, XmrOps,
};

pub const MAKER_ETH_ADDRESS: Address = address!("00000000000000000000000000000000000000bb");
pub const TAKER_ETH_ADDRESS: Address = address!("00000000000000000000000000000000000000aa");
pub const SWAP_FACTORY_ADDRESS: Address = address!("00000000000000000000000000000000000000cc");

pub const PRIMARY_XMR_ADDRESS: &str = "44AFFq5kSiGBoZ4NMDwYtN18obc8AemS33DBLWs3H7otXft3XjrpDtQGv7SqSsaBYBb98uNbr2VBBEt7f2wfn3RVGQBEP3A";

#[derive(Debug, Clone)]
pub struct FilterSpec {
    pub contract: Address,
    pub from_block: u64,
    pub topic: B256,
    pub mailbox: mpsc::Sender<Log>,
}

/// Scripted Ethereum chain for state-machine tests.
pub struct MockChain {
    pub our_address: Address,
    pub balance: Mutex<U256>,
    pub stage: Mutex<SwapFactory::Stage>,
    pub filters: Mutex<Vec<FilterSpec>>,
    pub claims: Mutex<Vec<(Address, B256)>>,
    pub relayed_claims: Mutex<Vec<(Address, B256, U256)>>,
    pub refunds: Mutex<Vec<(Address, B256)>>,
    pub set_ready_calls: Mutex<Vec<Address>>,
    pub new_swaps: Mutex<Vec<U256>>,
    pub block_timestamp: u64,
}

impl MockChain {
    pub fn new(our_address: Address) -> Self {
        Self {
            our_address,
            balance: Mutex::new(U256::from(10u64).pow(U256::from(18u64))),
            stage: Mutex::new(SwapFactory::Stage::PENDING),
            filters: Mutex::new(Vec::new()),
            claims: Mutex::new(Vec::new()),
            relayed_claims: Mutex::new(Vec::new()),
            refunds: Mutex::new(Vec::new()),
            set_ready_calls: Mutex::new(Vec::new()),
            new_swaps: Mutex::new(Vec::new()),
            block_timestamp: unix_now(),
        }
    }

    /// Delivers a log to every registered watcher for `topic`.
    pub async fn inject_log(&self, topic: B256, topics: Vec<B256>) {
        let mailboxes: Vec<mpsc::Sender<Log>> = self
            .filters
            .lock()
            .unwrap()
            .iter()
            .filter(|spec| spec.topic == topic)
            .map(|spec| spec.mailbox.clone())
            .collect();
        for mailbox in mailboxes {
            let log = Log {
                inner: alloy::primitives::Log {
                    address: SWAP_FACTORY_ADDRESS,
                    data: LogData::new_unchecked(topics.clone(), Bytes::new()),
                },
                ..Default::default()
            };
            let _ = mailbox.send(log).await;
        }
    }

    pub async fn wait_for_filter(&self, topic: B256) {
        for _ in 0..200 {
            if self
                .filters
                .lock()
                .unwrap()
                .iter()
                .any(|spec| spec.topic == topic)
            {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("no event filter registered for topic {topic}");
    }
}

#[async_trait]
impl EthOps for MockChain {
    fn address(&self) -> Address {
        self.our_address
    }

    fn swap_factory_addr(&self) -> Address {
        SWAP_FACTORY_ADDRESS
    }

    async fn balance(&self, _token: &CancellationToken) -> Result<U256, SwapError> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn block_number(&self, _token: &CancellationToken) -> Result<u64, SwapError> {
        Ok(100)
    }

    async fn swap_stage(
        &self,
        _token: &CancellationToken,
        _contract: Address,
        _swap_id: B256,
    ) -> Result<SwapFactory::Stage, SwapError> {
        Ok(*self.stage.lock().unwrap())
    }

    async fn check_contract_code(
        &self,
        _token: &CancellationToken,
        _contract: Address,
    ) -> Result<Address, SwapError> {
        Ok(Address::ZERO)
    }

    async fn new_swap(
        &self,
        _token: &CancellationToken,
        _pub_key_claim: B256,
        _pub_key_refund: B256,
        _claimer: Address,
        _timeout_duration: U256,
        _asset: Address,
        value: U256,
        _nonce: U256,
    ) -> Result<NewSwapReceipt, SwapError> {
        self.new_swaps.lock().unwrap().push(value);
        Ok(NewSwapReceipt {
            tx_hash: B256::repeat_byte(0x99),
            block_number: 101,
            block_timestamp: self.block_timestamp,
        })
    }

    async fn set_ready(
        &self,
        _token: &CancellationToken,
        contract: Address,
        _swap: &SwapFactory::Swap,
    ) -> Result<B256, SwapError> {
        self.set_ready_calls.lock().unwrap().push(contract);
        *self.stage.lock().unwrap() = SwapFactory::Stage::READY;
        Ok(B256::repeat_byte(0x88))
    }

    async fn claim(
        &self,
        _token: &CancellationToken,
        contract: Address,
        _swap: &SwapFactory::Swap,
        secret: B256,
    ) -> Result<B256, SwapError> {
        self.claims.lock().unwrap().push((contract, secret));
        Ok(B256::repeat_byte(0x77))
    }

    async fn refund(
        &self,
        _token: &CancellationToken,
        contract: Address,
        _swap: &SwapFactory::Swap,
        secret: B256,
    ) -> Result<B256, SwapError> {
        self.refunds.lock().unwrap().push((contract, secret));
        Ok(B256::repeat_byte(0x66))
    }

    async fn relayed_claim(
        &self,
        _token: &CancellationToken,
        _relayers: &[Arc<dyn RelayerClient>],
        contract: Address,
        _swap: &SwapFactory::Swap,
        secret: B256,
        fee_wei: U256,
    ) -> Result<B256, SwapError> {
        self.relayed_claims
            .lock()
            .unwrap()
            .push((contract, secret, fee_wei));
        Ok(B256::repeat_byte(0x55))
    }

    async fn wait_for_timestamp(
        &self,
        token: &CancellationToken,
        _ts: u64,
    ) -> Result<u64, SwapError> {
        // Timeouts never fire in these tests unless the swap is cancelled.
        token.cancelled().await;
        Err(SwapError::Canceled)
    }

    fn spawn_event_filter(
        &self,
        _token: CancellationToken,
        contract: Address,
        from_block: u64,
        topic: B256,
        mailbox: mpsc::Sender<Log>,
    ) {
        self.filters.lock().unwrap().push(FilterSpec {
            contract,
            from_block,
            topic,
            mailbox,
        });
    }
}

pub struct SweepCall {
    pub keypair: PrivateKeyPair,
    pub wallet_filename: String,
    pub restore_height: u64,
    pub destination: monero::Address,
}

/// Scripted Monero wallet for state-machine tests.
pub struct MockXmr {
    pub height: u64,
    pub transfers: Mutex<Vec<(monero::Address, u64, u64)>>,
    pub sweeps: Mutex<Vec<SweepCall>>,
    /// Lock height reported by `watch_for_lock`; `None` parks the watch
    /// until cancellation.
    pub lock_at_height: Option<u64>,
}

impl MockXmr {
    pub fn new() -> Self {
        Self {
            height: 2_000_000,
            transfers: Mutex::new(Vec::new()),
            sweeps: Mutex::new(Vec::new()),
            lock_at_height: None,
        }
    }

    pub fn with_lock_at(height: u64) -> Self {
        Self {
            lock_at_height: Some(height),
            ..Self::new()
        }
    }

    pub fn primary(&self) -> monero::Address {
        monero::Address::from_str(PRIMARY_XMR_ADDRESS).unwrap()
    }
}

#[async_trait]
impl XmrOps for MockXmr {
    async fn get_height(&self, _token: &CancellationToken) -> Result<u64, SwapError> {
        Ok(self.height)
    }

    async fn get_balance(
        &self,
        _token: &CancellationToken,
        _account: u32,
    ) -> Result<Balance, SwapError> {
        Ok(Balance {
            balance: 10_000_000_000_000,
            unlocked_balance: 10_000_000_000_000,
        })
    }

    async fn primary_address(
        &self,
        _token: &CancellationToken,
    ) -> Result<monero::Address, SwapError> {
        Ok(self.primary())
    }

    async fn transfer(
        &self,
        _token: &CancellationToken,
        destination: &monero::Address,
        _account: u32,
        amount_piconero: u64,
        min_confirmations: u64,
    ) -> Result<TransferReceipt, SwapError> {
        self.transfers
            .lock()
            .unwrap()
            .push((*destination, amount_piconero, min_confirmations));
        Ok(TransferReceipt {
            tx_hash: "mock-lock-tx".to_string(),
            height: self.height + 1,
            fee: 1,
        })
    }

    async fn sweep_joint_account(
        &self,
        _token: &CancellationToken,
        keypair: &PrivateKeyPair,
        _network: monero::Network,
        wallet_filename: &str,
        restore_height: u64,
        destination: monero::Address,
    ) -> Result<Vec<String>, SwapError> {
        self.sweeps.lock().unwrap().push(SweepCall {
            keypair: keypair.clone(),
            wallet_filename: wallet_filename.to_string(),
            restore_height,
            destination,
        });
        Ok(vec!["mock-sweep-tx".to_string()])
    }

    async fn wait_for_blocks(
        &self,
        _token: &CancellationToken,
        count: u64,
    ) -> Result<u64, SwapError> {
        Ok(self.height + count)
    }

    async fn watch_for_lock(
        &self,
        token: &CancellationToken,
        _address: &monero::Address,
        _amount_piconero: u64,
        _min_confirmations: u64,
    ) -> Result<u64, SwapError> {
        match self.lock_at_height {
            Some(height) => Ok(height),
            None => {
                token.cancelled().await;
                Err(SwapError::Canceled)
            }
        }
    }
}

pub struct NoRelayers;

#[async_trait]
impl RelayerDiscovery for NoRelayers {
    async fn discover(&self) -> anyhow::Result<Vec<Arc<dyn RelayerClient>>> {
        Ok(Vec::new())
    }
}

/// A discovery source advertising one relayer. The mock chain intercepts
/// `relayed_claim`, so the client itself is never driven.
pub struct OneRelayer;

#[async_trait]
impl RelayerDiscovery for OneRelayer {
    async fn discover(&self) -> anyhow::Result<Vec<Arc<dyn RelayerClient>>> {
        Ok(vec![Arc::new(DummyRelayer)])
    }
}

pub struct DummyRelayer;

#[async_trait]
impl RelayerClient for DummyRelayer {
    fn name(&self) -> String {
        "dummy-relayer".to_string()
    }

    async fn submit_claim(
        &self,
        _request: &eth_escrow::RelayClaimRequest,
    ) -> anyhow::Result<eth_escrow::RelayClaimResponse> {
        Ok(eth_escrow::RelayClaimResponse {
            tx_hash: B256::repeat_byte(0x44),
        })
    }
}

pub fn test_offer() -> Offer {
    Offer::new(
        ProvidesCoin::Xmr,
        BigDecimal::from_str("0.1").unwrap(),
        BigDecimal::from_str("10").unwrap(),
        ExchangeRate::new(BigDecimal::from_str("0.05").unwrap()),
        EthAsset::ETH,
    )
    .unwrap()
}

pub fn build_backend(
    eth: Arc<MockChain>,
    xmr: Arc<MockXmr>,
    db_dir: &std::path::Path,
) -> Arc<Backend> {
    build_backend_with_discovery(eth, xmr, db_dir, Arc::new(NoRelayers))
}

pub fn build_backend_with_discovery(
    eth: Arc<MockChain>,
    xmr: Arc<MockXmr>,
    db_dir: &std::path::Path,
    relayer_discovery: Arc<dyn RelayerDiscovery>,
) -> Arc<Backend> {
    Arc::new(Backend {
        env: EnvConfig::for_env(Env::Development),
        options: SwapOptions::default(),
        eth,
        xmr,
        recovery_db: Arc::new(RecoveryDb::new(db_dir, "recovery").unwrap()),
        swap_manager: Arc::new(SwapManager::new()),
        offers: Arc::new(OfferManager::new()),
        relayer_discovery,
        shutdown: CancellationToken::new(),
    })
}

pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Collects statuses from the channel until the expected terminal status
/// arrives or the timeout hits.
pub async fn wait_for_status(
    status_rx: &mut mpsc::UnboundedReceiver<swap_engine::Status>,
    expected: swap_engine::Status,
) -> Vec<swap_engine::Status> {
    let mut seen = Vec::new();
    let deadline = tokio::time::Duration::from_secs(5);
    let result = tokio::time::timeout(deadline, async {
        while let Some(status) = status_rx.recv().await {
            seen.push(status);
            if status == expected {
                return;
            }
        }
    })
    .await;
    assert!(
        result.is_ok(),
        "timed out waiting for {expected:?}; saw {seen:?}"
    );
    seen
}
