use alloy::primitives::{keccak256, B256};
use alloy::sol;
use alloy::sol_types::{SolEvent, SolValue};

sol! {
    /// On-chain escrow holding the ETH-side asset until claim or refund.
    #[sol(rpc)]
    contract SwapFactory {
        #[derive(Debug, PartialEq, Eq)]
        enum Stage {
            INVALID,
            PENDING,
            READY,
            COMPLETED
        }

        /// Mirror of the contract's Swap struct; its ABI encoding hashes to
        /// the swap ID used as a log topic.
        #[derive(Debug, serde::Serialize, serde::Deserialize)]
        struct Swap {
            address payable owner;
            address payable claimer;
            bytes32 pubKeyClaim;
            bytes32 pubKeyRefund;
            uint256 timeout0;
            uint256 timeout1;
            address asset;
            uint256 value;
            uint256 nonce;
        }

        event New(
            bytes32 swapID,
            bytes32 claimKey,
            bytes32 refundKey,
            uint256 timeout0,
            uint256 timeout1,
            address asset,
            uint256 value
        );
        event Ready(bytes32 indexed swapID);
        event Claimed(bytes32 indexed swapID, bytes32 indexed s);
        event Refunded(bytes32 indexed swapID, bytes32 indexed s);

        function newSwap(
            bytes32 pubKeyClaim,
            bytes32 pubKeyRefund,
            address payable claimer,
            uint256 timeoutDuration,
            address asset,
            uint256 value,
            uint256 nonce
        ) external payable returns (bytes32);

        function setReady(Swap memory swap) external;
        function claim(Swap memory swap, bytes32 s) external;
        function claimRelayer(Swap memory swap, bytes32 s, uint256 fee) external;
        function refund(Swap memory swap, bytes32 s) external;
        function swaps(bytes32 swapID) external view returns (Stage);
        function trustedForwarder() external view returns (address);
    }

    /// Minimal surface of the GSN forwarder used for relayed claims.
    #[sol(rpc)]
    contract Forwarder {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct ForwardRequest {
            address from;
            address to;
            uint256 value;
            uint256 gas;
            uint256 nonce;
            bytes data;
            uint256 validUntilTime;
        }

        function getNonce(address from) external view returns (uint256);

        function verify(
            ForwardRequest calldata forwardRequest,
            bytes32 domainSeparator,
            bytes32 requestTypeHash,
            bytes calldata suffixData,
            bytes calldata signature
        ) external view;
    }
}

/// Swap ID as emitted in the contract's log topics: keccak-256 of the
/// ABI-encoded Swap struct.
pub fn swap_id(swap: &SwapFactory::Swap) -> B256 {
    keccak256(swap.abi_encode())
}

pub fn ready_topic() -> B256 {
    SwapFactory::Ready::SIGNATURE_HASH
}

pub fn claimed_topic() -> B256 {
    SwapFactory::Claimed::SIGNATURE_HASH
}

pub fn refunded_topic() -> B256 {
    SwapFactory::Refunded::SIGNATURE_HASH
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256, Address, U256};

    fn sample_swap() -> SwapFactory::Swap {
        SwapFactory::Swap {
            owner: address!("00000000000000000000000000000000000000aa"),
            claimer: address!("00000000000000000000000000000000000000bb"),
            pubKeyClaim: b256!("1111111111111111111111111111111111111111111111111111111111111111"),
            pubKeyRefund: b256!("2222222222222222222222222222222222222222222222222222222222222222"),
            timeout0: U256::from(1_700_000_000u64),
            timeout1: U256::from(1_700_003_600u64),
            asset: Address::ZERO,
            value: U256::from(10u64).pow(U256::from(18u64)),
            nonce: U256::from(42u64),
        }
    }

    #[test]
    fn swap_id_matches_manual_abi_layout() {
        let swap = sample_swap();

        // abi.encode of a static struct is the concatenation of its fields,
        // each left-padded to 32 bytes.
        let mut manual = Vec::with_capacity(9 * 32);
        for addr in [swap.owner, swap.claimer] {
            manual.extend_from_slice(&[0u8; 12]);
            manual.extend_from_slice(addr.as_slice());
        }
        manual.extend_from_slice(swap.pubKeyClaim.as_slice());
        manual.extend_from_slice(swap.pubKeyRefund.as_slice());
        manual.extend_from_slice(&swap.timeout0.to_be_bytes::<32>());
        manual.extend_from_slice(&swap.timeout1.to_be_bytes::<32>());
        manual.extend_from_slice(&[0u8; 12]);
        manual.extend_from_slice(swap.asset.as_slice());
        manual.extend_from_slice(&swap.value.to_be_bytes::<32>());
        manual.extend_from_slice(&swap.nonce.to_be_bytes::<32>());

        assert_eq!(swap_id(&swap), keccak256(manual));
    }

    #[test]
    fn swap_id_is_sensitive_to_every_field() {
        let base = sample_swap();
        let mut changed = base.clone();
        changed.nonce = U256::from(43u64);
        assert_ne!(swap_id(&base), swap_id(&changed));

        let mut changed = base.clone();
        changed.value += U256::from(1u64);
        assert_ne!(swap_id(&base), swap_id(&changed));
    }

    #[test]
    fn event_topics_are_distinct() {
        assert_ne!(ready_topic(), claimed_topic());
        assert_ne!(claimed_topic(), refunded_topic());
        assert_ne!(ready_topic(), refunded_topic());
    }

    #[test]
    fn swap_round_trips_through_json() {
        let swap = sample_swap();
        let json = serde_json::to_string(&swap).unwrap();
        let decoded: SwapFactory::Swap = serde_json::from_str(&json).unwrap();
        assert_eq!(swap_id(&swap), swap_id(&decoded));
    }
}
