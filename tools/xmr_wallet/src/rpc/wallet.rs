use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use monero_rpc::{
    monero::{Address, Amount, PrivateKey},
    GetTransfersCategory, GetTransfersSelector, GotTransfer, RpcClientBuilder, SweepAllArgs,
    TransferHeight, TransferOptions, TransferPriority, WalletClient,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use anyhow::anyhow;

use crate::rpc::{retry_with_timeout, RetryConfig};
use crate::types::{Result, XmrWalletError};

/// Result of a completed (confirmed) outbound transfer.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub tx_hash: String,
    pub height: u64,
    pub fee: u64,
}

/// Wallet balance for one account, in piconero.
#[derive(Debug, Clone, Copy)]
pub struct Balance {
    pub balance: u64,
    pub unlocked_balance: u64,
}

pub struct XmrWallet {
    client: WalletClient,
    retry: RetryConfig,
    confirmation_poll: Duration,
}

impl XmrWallet {
    pub async fn connect(url: &str) -> Result<Self> {
        let retry = RetryConfig::from_env();
        Self::connect_with_config(url, retry).await
    }

    pub async fn connect_with_config(url: &str, retry: RetryConfig) -> Result<Self> {
        debug!(rpc_url = url, "Connecting to Monero wallet RPC");
        let rpc_client = RpcClientBuilder::new().build(url)?;
        let client = rpc_client.wallet();
        Ok(Self {
            client,
            retry,
            confirmation_poll: Duration::from_secs(10),
        })
    }

    /// Shortens the confirmation/height poll, for dev environments with
    /// fast background mining.
    pub fn set_confirmation_poll(&mut self, poll: Duration) {
        self.confirmation_poll = poll;
    }

    async fn with_retry<T, F, Fut>(
        &self,
        token: &CancellationToken,
        label: &'static str,
        action: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        retry_with_timeout(token, label, &self.retry, action).await
    }

    pub async fn create_wallet(
        &self,
        token: &CancellationToken,
        filename: &str,
        password: Option<&str>,
        language: &str,
    ) -> Result<()> {
        debug!(wallet = filename, "Creating Monero wallet");
        let filename = filename.to_string();
        let password = password.map(|value| value.to_string());
        let language = language.to_string();
        self.with_retry(token, "create_wallet", || async {
            self.client
                .create_wallet(filename.clone(), password.clone(), language.clone())
                .await?;
            Ok(())
        })
        .await
    }

    pub async fn open_wallet(
        &self,
        token: &CancellationToken,
        filename: &str,
        password: Option<&str>,
    ) -> Result<()> {
        debug!(wallet = filename, "Opening Monero wallet");
        let filename = filename.to_string();
        let password = password.map(|value| value.to_string());
        self.with_retry(token, "open_wallet", || async {
            self.client
                .open_wallet(filename.clone(), password.clone())
                .await?;
            Ok(())
        })
        .await
    }

    pub async fn close_wallet(&self, token: &CancellationToken) -> Result<()> {
        debug!("Closing Monero wallet");
        self.with_retry(token, "close_wallet", || async {
            self.client.close_wallet().await?;
            Ok(())
        })
        .await
    }

    pub async fn get_balance(&self, token: &CancellationToken, account: u32) -> Result<Balance> {
        self.with_retry(token, "get_balance", || async {
            let balance = self.client.get_balance(account, None).await?;
            Ok(Balance {
                balance: balance.balance.as_pico(),
                unlocked_balance: balance.unlocked_balance.as_pico(),
            })
        })
        .await
    }

    pub async fn primary_address(&self, token: &CancellationToken) -> Result<Address> {
        self.with_retry(token, "get_address", || async {
            let addresses = self.client.get_address(0, None).await?;
            Ok(addresses.address)
        })
        .await
    }

    pub async fn refresh(&self, token: &CancellationToken, start_height: Option<u64>) -> Result<()> {
        debug!(start_height, "Refreshing Monero wallet");
        self.with_retry(token, "refresh", || async {
            self.client.refresh(start_height).await?;
            Ok(())
        })
        .await
    }

    pub async fn get_height(&self, token: &CancellationToken) -> Result<u64> {
        self.with_retry(token, "get_height", || async {
            let height = self.client.get_height().await?;
            Ok(height.get())
        })
        .await
    }

    pub async fn get_incoming_transfers(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<GotTransfer>> {
        self.with_retry(token, "get_transfers", || async {
            let mut selector = GetTransfersSelector::default();
            let mut category_selector = HashMap::new();
            category_selector.insert(GetTransfersCategory::In, true);
            selector.category_selector = category_selector;
            let transfers = self.client.get_transfers(selector).await?;
            let mut results = Vec::new();
            for values in transfers.values() {
                results.extend(values.clone());
            }
            Ok(results)
        })
        .await
    }

    pub async fn generate_from_keys(
        &self,
        token: &CancellationToken,
        spend_key_bytes: [u8; 32],
        view_key_bytes: [u8; 32],
        address: &str,
        filename: &str,
        restore_height: Option<u64>,
    ) -> Result<()> {
        debug!(wallet = filename, "Importing spend/view keys into wallet");
        let address_str = address.to_string();
        PrivateKey::from_slice(&spend_key_bytes)
            .map_err(|err| anyhow!("invalid spend key: {err}"))?;
        PrivateKey::from_slice(&view_key_bytes).map_err(|err| anyhow!("invalid view key: {err}"))?;
        Address::from_str(&address_str).map_err(|err| anyhow!("invalid address: {err}"))?;
        self.with_retry(token, "generate_from_keys", || async {
            let spend_key = PrivateKey::from_slice(&spend_key_bytes)
                .map_err(|err| anyhow!("invalid spend key: {err}"))?;
            let view_key = PrivateKey::from_slice(&view_key_bytes)
                .map_err(|err| anyhow!("invalid view key: {err}"))?;
            let address =
                Address::from_str(&address_str).map_err(|err| anyhow!("invalid address: {err}"))?;
            let args = monero_rpc::GenerateFromKeysArgs {
                restore_height,
                filename: filename.to_string(),
                address,
                spendkey: Some(spend_key),
                viewkey: view_key,
                password: String::new(),
                autosave_current: Some(true),
            };
            self.client.generate_from_keys(args).await?;
            Ok(())
        })
        .await
    }

    pub async fn sweep_all(&self, token: &CancellationToken, destination: &Address) -> Result<Vec<String>> {
        debug!(%destination, "Sweeping wallet balance");
        let destination = *destination;
        self.with_retry(token, "sweep_all", || async {
            let args = SweepAllArgs {
                address: destination,
                account_index: 0,
                subaddr_indices: None,
                priority: TransferPriority::Default,
                mixin: 15,
                ring_size: 16,
                unlock_time: 0,
                get_tx_keys: Some(true),
                below_amount: None,
                do_not_relay: None,
                get_tx_hex: None,
                get_tx_metadata: None,
            };
            let result = self.client.sweep_all(args).await?;
            Ok(result
                .tx_hash_list
                .iter()
                .map(|hash| hash.to_string())
                .collect())
        })
        .await
    }

    /// Sends `amount` piconero to `destination` and waits until the transfer
    /// has `min_confirmations` confirmations.
    ///
    /// The submission itself is made exactly once: a transfer that timed out
    /// may still have been broadcast, so it must never be resubmitted. Only
    /// the confirmation polling afterwards retries.
    pub async fn transfer(
        &self,
        token: &CancellationToken,
        destination: &Address,
        account: u32,
        amount: u64,
        min_confirmations: u64,
    ) -> Result<TransferReceipt> {
        let mut destinations = HashMap::new();
        destinations.insert(*destination, Amount::from_pico(amount));
        let options = TransferOptions {
            account_index: Some(account),
            subaddr_indices: None,
            mixin: None,
            ring_size: None,
            unlock_time: None,
            payment_id: None,
            do_not_relay: None,
        };

        let data = tokio::select! {
            _ = token.cancelled() => return Err(XmrWalletError::Canceled),
            result = self.client.transfer(destinations, TransferPriority::Default, options) => result?,
        };

        let tx_hash = data.tx_hash.to_string();
        let txid = data.tx_hash.0;
        let fee = data.fee.as_pico();
        info!(%tx_hash, "Transfer accepted by daemon; awaiting confirmations");

        loop {
            tokio::select! {
                _ = token.cancelled() => return Err(XmrWalletError::Canceled),
                _ = tokio::time::sleep(self.confirmation_poll) => {}
            }

            self.refresh(token, None).await?;
            let transfer = self
                .with_retry(token, "get_transfer", || async {
                    Ok(self.client.get_transfer(txid, Some(account)).await?)
                })
                .await?;

            let Some(transfer) = transfer else {
                debug!("Transfer not yet visible to the wallet");
                continue;
            };

            match transfer.height {
                TransferHeight::InPool => {
                    debug!("Transfer still in pool");
                }
                TransferHeight::Confirmed(height) => {
                    let lock_height = height.get();
                    let chain_height = self.get_height(token).await?;
                    let confirmations = chain_height.saturating_sub(lock_height) + 1;
                    if confirmations >= min_confirmations {
                        return Ok(TransferReceipt {
                            tx_hash,
                            height: lock_height,
                            fee,
                        });
                    }
                    debug!(
                        confirmations,
                        required = min_confirmations,
                        "Awaiting transfer confirmations"
                    );
                }
            }
        }
    }
}
