use alloy::rpc::types::Log;
use tokio::sync::oneshot;

use crate::message::{Message, NotifyEthLocked, SendKeysMessage};
use crate::types::Status;

/// Input alphabet of the per-swap state machines. Chain-log events carry no
/// acknowledgement; peer- and caller-driven events carry a oneshot responder.
pub enum Event {
    /// Counterparty keys arrived (taker side: selects the offer and answers
    /// with `NotifyETHLocked` once the ETH is locked).
    KeysReceived {
        message: SendKeysMessage,
        ack: oneshot::Sender<anyhow::Result<Message>>,
    },
    /// The taker notified us that the ETH-side asset is locked.
    EthLocked {
        message: NotifyEthLocked,
        ack: oneshot::Sender<anyhow::Result<()>>,
    },
    /// `Ready` log observed on-chain.
    ContractReady { log: Log },
    /// The joint Monero account reached the required confirmations.
    XmrLocked { lock_height: u64 },
    /// `Claimed` log observed on-chain (taker side: reveals the secret).
    Claimed { log: Log },
    /// `Refunded` log observed on-chain (maker side: reveals the taker's
    /// secret, letting us reclaim the locked XMR).
    EthRefunded { log: Log },
    /// Timeout `t1` elapsed without a claim; refund is now required.
    ShouldRefund,
    /// External abort request.
    Exit {
        ack: oneshot::Sender<anyhow::Result<()>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    KeysReceived,
    EthLocked,
    ContractReady,
    XmrLocked,
    Claimed,
    EthRefunded,
    ShouldRefund,
    Exit,
    None,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::KeysReceived { .. } => EventType::KeysReceived,
            Event::EthLocked { .. } => EventType::EthLocked,
            Event::ContractReady { .. } => EventType::ContractReady,
            Event::XmrLocked { .. } => EventType::XmrLocked,
            Event::Claimed { .. } => EventType::Claimed,
            Event::EthRefunded { .. } => EventType::EthRefunded,
            Event::ShouldRefund => EventType::ShouldRefund,
            Event::Exit { .. } => EventType::Exit,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventType::KeysReceived => "EventKeysReceived",
            EventType::EthLocked => "EventETHLocked",
            EventType::ContractReady => "EventContractReady",
            EventType::XmrLocked => "EventXMRLocked",
            EventType::Claimed => "EventClaimed",
            EventType::EthRefunded => "EventETHRefunded",
            EventType::ShouldRefund => "EventShouldRefund",
            EventType::Exit => "EventExit",
            EventType::None => "EventNone",
        };
        f.write_str(name)
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event_type())
    }
}

/// Maps a persisted status to the event the maker machine expects next.
pub fn next_expected_event_from_status(status: Status) -> EventType {
    match status {
        Status::KeysExchanged | Status::EthLocked => EventType::EthLocked,
        Status::XmrLocked | Status::ContractReady => EventType::ContractReady,
        _ => EventType::None,
    }
}
