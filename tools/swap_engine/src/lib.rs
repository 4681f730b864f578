//! Trust-minimized XMR↔ETH atomic swap engine.
//!
//! Drives each swap from key exchange through asset locking, the ready
//! signal, claim and, on fault, refund. The two roles are the maker (offers
//! XMR, receives the ETH-side asset) and the taker (the mirror). External
//! collaborators — the p2p host, the RPC server, wallet transports — plug
//! in through the `backend` traits and the message codec.

pub mod amounts;
pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod keys;
pub mod maker;
pub mod manager;
pub mod message;
pub mod offers;
pub mod recovery;
pub mod taker;
pub mod types;

pub use backend::{Backend, EthOps, MoneroBackend, RelayerDiscovery, SwapOptions, XmrOps};
pub use config::{Env, EnvConfig};
pub use db::{CounterpartyKeys, EthereumSwapInfo, OngoingOffer, RecoveryDb};
pub use error::SwapError;
pub use event::{Event, EventType};
pub use keys::{generate_keys_and_proof, verify_keys_and_proof, KeysAndProof};
pub use maker::{MakerSwap, SwapHandle};
pub use manager::{ManagerError, SwapManager};
pub use message::{Message, MessageError, NotifyEthLocked, QueryResponse, SendKeysMessage};
pub use offers::{Offer, OfferError, OfferExtra, OfferManager};
pub use recovery::recover_ongoing_swaps;
pub use taker::{TakerHandle, TakerSwap};
pub use types::{EthAsset, Hash, ProvidesCoin, Status, StatusSender, SwapInfo};
