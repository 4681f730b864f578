use alloy::primitives::{Address, B256};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::amounts::ExchangeRate;

/// 32-byte identifier used for offers, transactions and contract swap IDs.
pub type Hash = B256;

pub fn is_hash_zero(hash: &Hash) -> bool {
    *hash == Hash::ZERO
}

/// The coin a party offers. Only XMR offers exist in this protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvidesCoin {
    #[serde(rename = "XMR")]
    Xmr,
}

impl std::fmt::Display for ProvidesCoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("XMR")
    }
}

/// The Ethereum-side asset: native ETH (zero address) or an ERC-20 token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EthAsset(pub Address);

impl EthAsset {
    pub const ETH: EthAsset = EthAsset(Address::ZERO);

    pub fn is_eth(&self) -> bool {
        self.0 == Address::ZERO
    }

    pub fn address(&self) -> Address {
        self.0
    }
}

impl std::fmt::Display for EthAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_eth() {
            f.write_str("ETH")
        } else {
            write!(f, "ERC20({})", self.0)
        }
    }
}

/// Lifecycle status of one swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    KeysExchanged,
    EthLocked,
    XmrLocked,
    ContractReady,
    CompletedSuccess,
    CompletedRefund,
    CompletedAbort,
}

impl Status {
    pub fn is_ongoing(&self) -> bool {
        matches!(
            self,
            Status::KeysExchanged | Status::EthLocked | Status::XmrLocked | Status::ContractReady
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::KeysExchanged => "KeysExchanged",
            Status::EthLocked => "ETHLocked",
            Status::XmrLocked => "XMRLocked",
            Status::ContractReady => "ContractReady",
            Status::CompletedSuccess => "Success",
            Status::CompletedRefund => "Refunded",
            Status::CompletedAbort => "Aborted",
        };
        f.write_str(name)
    }
}

/// Push side of a swap's status channel; every transition is published here
/// for the RPC layer to surface.
#[derive(Debug, Clone)]
pub struct StatusSender(mpsc::UnboundedSender<Status>);

impl StatusSender {
    pub fn channel() -> (StatusSender, mpsc::UnboundedReceiver<Status>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StatusSender(tx), rx)
    }

    pub fn send(&self, status: Status) {
        // The receiver may be gone (e.g. nobody is watching); that's fine.
        let _ = self.0.send(status);
    }
}

/// Bookkeeping for one swap, owned by its state machine and indexed by the
/// swap manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInfo {
    #[serde(rename = "offerID")]
    pub offer_id: Hash,
    pub provides: ProvidesCoin,
    /// Amount of XMR provided by the maker.
    pub provided_amount: BigDecimal,
    /// Amount of the ETH asset expected in return.
    pub expected_amount: BigDecimal,
    pub exchange_rate: ExchangeRate,
    pub eth_asset: EthAsset,
    pub status: Status,
    pub monero_start_height: u64,
    #[serde(skip)]
    pub status_sender: Option<StatusSender>,
}

impl SwapInfo {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        offer_id: Hash,
        provides: ProvidesCoin,
        provided_amount: BigDecimal,
        expected_amount: BigDecimal,
        exchange_rate: ExchangeRate,
        eth_asset: EthAsset,
        status: Status,
        monero_start_height: u64,
        status_sender: StatusSender,
    ) -> Self {
        Self {
            offer_id,
            provides,
            provided_amount,
            expected_amount,
            exchange_rate,
            eth_asset,
            status,
            monero_start_height,
            status_sender: Some(status_sender),
        }
    }

    /// Updates the status and publishes it on the status channel.
    pub fn set_status(&mut self, status: Status) {
        self.status = status;
        if let Some(sender) = &self.status_sender {
            sender.send(status);
        }
    }
}
