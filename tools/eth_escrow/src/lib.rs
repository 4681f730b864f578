//! Ethereum escrow integration.
//!
//! Bindings for the SwapFactory escrow contract and its trusted GSN
//! forwarder, plus the chain-facing plumbing the swap state machines need:
//! log watching, block-timestamp waits, relayed (gasless) claims and
//! receipt validation.

pub mod block;
pub mod client;
pub mod contract;
pub mod error;
pub mod relayer;
pub mod watcher;

pub use client::EthClient;
pub use contract::{
    claimed_topic, ready_topic, refunded_topic, swap_id, Forwarder, SwapFactory,
};
pub use error::{EthError, RelayerError};
pub use relayer::{
    check_claimed_log, check_swap_factory_contract_code, create_relay_claim_request,
    forward_request_digest, forwarder_domain_separator, submit_to_relayers,
    validate_claim_request, wait_for_claim_receipt, CodeDigests, RelayClaimRequest,
    RelayClaimResponse, RelayerClient, RELAYED_CLAIM_GAS,
};
pub use watcher::EventFilter;
