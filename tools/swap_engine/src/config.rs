use std::time::Duration;

use serde::{Deserialize, Serialize};
use xmr_wallet::monero::Network;

/// Deployment environment; selects chain IDs, the Monero network and the
/// polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    Development,
    Stagenet,
    Mainnet,
}

impl std::fmt::Display for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Env::Development => "development",
            Env::Stagenet => "stagenet",
            Env::Mainnet => "mainnet",
        };
        f.write_str(name)
    }
}

/// Per-environment defaults. Each call returns a fresh instance so callers
/// can tune fields without affecting one another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub env: Env,
    pub eth_chain_id: u64,
    pub monero_network: Network,
    /// Average Monero block time, used to judge whether a contract timeout
    /// leaves room for the XMR lock to confirm.
    pub monero_block_time: Duration,
    /// Poll interval for Monero chain-height waits.
    pub block_sleep: Duration,
    /// XMR confirmations required before a lock is considered final.
    pub min_spend_confirmations: u64,
    /// Duration of each contract timeout window (t0 = lock + window,
    /// t1 = t0 + window).
    pub contract_timeout: Duration,
}

impl EnvConfig {
    pub fn for_env(env: Env) -> Self {
        match env {
            // Ganache + regtest monerod with fast background mining.
            Env::Development => Self {
                env,
                eth_chain_id: 1337,
                monero_network: Network::Mainnet,
                monero_block_time: Duration::from_secs(1),
                block_sleep: Duration::from_secs(1),
                min_spend_confirmations: 1,
                contract_timeout: Duration::from_secs(120),
            },
            Env::Stagenet => Self {
                env,
                eth_chain_id: 5,
                monero_network: Network::Stagenet,
                monero_block_time: Duration::from_secs(120),
                block_sleep: Duration::from_secs(10),
                min_spend_confirmations: 10,
                contract_timeout: Duration::from_secs(60 * 60),
            },
            Env::Mainnet => Self {
                env,
                eth_chain_id: 1,
                monero_network: Network::Mainnet,
                monero_block_time: Duration::from_secs(120),
                block_sleep: Duration::from_secs(10),
                min_spend_confirmations: 10,
                contract_timeout: Duration::from_secs(2 * 60 * 60),
            },
        }
    }
}
