//! Durable per-swap recovery records.
//!
//! Layout: `<base>/<namespace>/<offerID>/<record>.json`, one JSON document
//! per record. Writes land in a temp file that is fsynced and renamed into
//! place, so a record is durable before the on-chain action it protects.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use xmr_wallet::{PrivateSpendKey, PrivateViewKey, PublicKey};

use crate::offers::{Offer, OfferExtra};
use crate::types::{Hash, Status};

const SWAP_PRIVATE_KEY_RECORD: &str = "swap-private-key";
const COUNTERPARTY_SWAP_KEYS_RECORD: &str = "counterparty-swap-keys";
const COUNTERPARTY_SWAP_PRIVATE_KEY_RECORD: &str = "counterparty-swap-private-key";
const ETH_SWAP_INFO_RECORD: &str = "eth-swap-info";
const RELAYER_INFO_RECORD: &str = "relayer-info";
const OFFER_RECORD: &str = "offer";

/// Everything the Ethereum side needs to resume a crashed swap: where to
/// re-attach watchers and which contract swap to claim or refund.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthereumSwapInfo {
    pub start_block: u64,
    #[serde(rename = "swapID")]
    pub swap_id: Hash,
    pub swap: eth_escrow::SwapFactory::Swap,
    pub contract_address: Address,
}

/// The counterparty's shared keys for the joint Monero account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterpartyKeys {
    pub public_spend_key: PublicKey,
    pub private_view_key: PrivateViewKey,
}

/// The offer a swap was made from, with the last committed status. This is
/// the record the startup recovery scan keys off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OngoingOffer {
    pub offer: Offer,
    pub status: Status,
    pub monero_start_height: u64,
    #[serde(default)]
    pub extra: OfferExtra,
}

pub struct RecoveryDb {
    base: PathBuf,
}

impl RecoveryDb {
    pub fn new<P: AsRef<Path>>(base_dir: P, namespace: &str) -> Result<Self> {
        let base = base_dir.as_ref().join(namespace);
        fs::create_dir_all(&base)
            .with_context(|| format!("Failed to create directory: {:?}", base))?;
        Ok(Self { base })
    }

    fn offer_dir(&self, offer_id: &Hash) -> PathBuf {
        self.base.join(format!("{offer_id:#x}"))
    }

    fn record_path(&self, offer_id: &Hash, record: &str) -> PathBuf {
        self.offer_dir(offer_id).join(format!("{record}.json"))
    }

    fn put_record<T: Serialize>(&self, offer_id: &Hash, record: &str, value: &T) -> Result<()> {
        let dir = self.offer_dir(offer_id);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create directory: {:?}", dir))?;

        let path = self.record_path(offer_id, record);
        let tmp_path = dir.join(format!(".{record}.json.tmp"));
        let json = serde_json::to_vec_pretty(value)
            .with_context(|| format!("Failed to serialize record {record}"))?;

        fs::write(&tmp_path, &json)
            .with_context(|| format!("Failed to write record file: {:?}", tmp_path))?;
        File::open(&tmp_path)
            .and_then(|file| file.sync_all())
            .with_context(|| format!("Failed to sync record file: {:?}", tmp_path))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to commit record file: {:?}", path))?;
        File::open(&dir)
            .and_then(|handle| handle.sync_all())
            .with_context(|| format!("Failed to sync record directory: {:?}", dir))?;
        Ok(())
    }

    fn get_record<T: DeserializeOwned>(&self, offer_id: &Hash, record: &str) -> Result<Option<T>> {
        let path = self.record_path(offer_id, record);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read record file: {:?}", path))?;
        let value = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse record file: {:?}", path))?;
        Ok(Some(value))
    }

    pub fn put_swap_private_key(&self, offer_id: &Hash, key: &PrivateSpendKey) -> Result<()> {
        self.put_record(offer_id, SWAP_PRIVATE_KEY_RECORD, key)
    }

    pub fn get_swap_private_key(&self, offer_id: &Hash) -> Result<Option<PrivateSpendKey>> {
        self.get_record(offer_id, SWAP_PRIVATE_KEY_RECORD)
    }

    pub fn put_counterparty_swap_keys(
        &self,
        offer_id: &Hash,
        keys: &CounterpartyKeys,
    ) -> Result<()> {
        self.put_record(offer_id, COUNTERPARTY_SWAP_KEYS_RECORD, keys)
    }

    pub fn get_counterparty_swap_keys(&self, offer_id: &Hash) -> Result<Option<CounterpartyKeys>> {
        self.get_record(offer_id, COUNTERPARTY_SWAP_KEYS_RECORD)
    }

    pub fn put_counterparty_swap_private_key(
        &self,
        offer_id: &Hash,
        key: &PrivateSpendKey,
    ) -> Result<()> {
        self.put_record(offer_id, COUNTERPARTY_SWAP_PRIVATE_KEY_RECORD, key)
    }

    pub fn get_counterparty_swap_private_key(
        &self,
        offer_id: &Hash,
    ) -> Result<Option<PrivateSpendKey>> {
        self.get_record(offer_id, COUNTERPARTY_SWAP_PRIVATE_KEY_RECORD)
    }

    pub fn put_ethereum_swap_info(&self, offer_id: &Hash, info: &EthereumSwapInfo) -> Result<()> {
        self.put_record(offer_id, ETH_SWAP_INFO_RECORD, info)
    }

    pub fn get_ethereum_swap_info(&self, offer_id: &Hash) -> Result<Option<EthereumSwapInfo>> {
        self.get_record(offer_id, ETH_SWAP_INFO_RECORD)
    }

    pub fn put_relayer_info(&self, offer_id: &Hash, extra: &OfferExtra) -> Result<()> {
        self.put_record(offer_id, RELAYER_INFO_RECORD, extra)
    }

    pub fn get_relayer_info(&self, offer_id: &Hash) -> Result<Option<OfferExtra>> {
        self.get_record(offer_id, RELAYER_INFO_RECORD)
    }

    pub fn put_ongoing_offer(&self, offer_id: &Hash, ongoing: &OngoingOffer) -> Result<()> {
        self.put_record(offer_id, OFFER_RECORD, ongoing)
    }

    pub fn get_ongoing_offer(&self, offer_id: &Hash) -> Result<Option<OngoingOffer>> {
        self.get_record(offer_id, OFFER_RECORD)
    }

    /// Offer IDs that still have recovery records on disk.
    pub fn list_offer_ids(&self) -> Result<Vec<Hash>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.base)
            .with_context(|| format!("Failed to list directory: {:?}", self.base))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Ok(id) = name.parse::<Hash>() {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Removes every record for an offer. Idempotent.
    pub fn delete_swap(&self, offer_id: &Hash) -> Result<()> {
        let dir = self.offer_dir(offer_id);
        if !dir.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&dir).with_context(|| format!("Failed to delete records: {:?}", dir))
    }
}
