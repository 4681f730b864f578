use alloy::primitives::{address, keccak256, Address, Bytes, LogData, B256, U256};
use alloy::rpc::types::Log;
use eth_escrow::{
    check_claimed_log, claimed_topic, forward_request_digest, forwarder_domain_separator,
    swap_id, RelayClaimRequest, RelayerError, SwapFactory,
};

fn sample_swap() -> SwapFactory::Swap {
    SwapFactory::Swap {
        owner: address!("00000000000000000000000000000000000000aa"),
        claimer: address!("00000000000000000000000000000000000000bb"),
        pubKeyClaim: B256::repeat_byte(0x11),
        pubKeyRefund: B256::repeat_byte(0x22),
        timeout0: U256::from(1_700_000_000u64),
        timeout1: U256::from(1_700_003_600u64),
        asset: Address::ZERO,
        value: U256::from(10u64).pow(U256::from(17u64)),
        nonce: U256::from(42u64),
    }
}

fn claimed_log(contract: Address, id: B256, secret: B256) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address: contract,
            data: LogData::new_unchecked(vec![claimed_topic(), id, secret], Bytes::new()),
        },
        ..Default::default()
    }
}

#[test]
fn domain_separator_depends_on_chain_and_forwarder() {
    let forwarder = address!("00000000000000000000000000000000000000cc");
    let ganache = forwarder_domain_separator(U256::from(1337u64), forwarder);
    let mainnet = forwarder_domain_separator(U256::from(1u64), forwarder);
    assert_ne!(ganache, mainnet);

    let other = address!("00000000000000000000000000000000000000cd");
    assert_ne!(ganache, forwarder_domain_separator(U256::from(1337u64), other));
}

#[test]
fn forward_request_digest_commits_to_calldata() {
    let domain = B256::repeat_byte(0x77);
    let base = eth_escrow::Forwarder::ForwardRequest {
        from: address!("00000000000000000000000000000000000000bb"),
        to: address!("00000000000000000000000000000000000000aa"),
        value: U256::ZERO,
        gas: U256::from(eth_escrow::RELAYED_CLAIM_GAS),
        nonce: U256::from(7u64),
        data: Bytes::from(vec![1, 2, 3]),
        validUntilTime: U256::ZERO,
    };

    let mut tampered = base.clone();
    tampered.data = Bytes::from(vec![1, 2, 4]);
    assert_ne!(
        forward_request_digest(&base, &domain),
        forward_request_digest(&tampered, &domain)
    );

    let mut renonced = base.clone();
    renonced.nonce = U256::from(8u64);
    assert_ne!(
        forward_request_digest(&base, &domain),
        forward_request_digest(&renonced, &domain)
    );
}

#[test]
fn accepts_well_formed_claimed_log() {
    let contract = address!("00000000000000000000000000000000000000aa");
    let swap = sample_swap();
    let id = swap_id(&swap);
    let secret = B256::repeat_byte(0x5a);

    let log = claimed_log(contract, id, secret);
    assert!(check_claimed_log(&log, contract, id, secret).is_ok());
}

#[test]
fn rejects_claimed_log_with_wrong_topic_count() {
    let contract = address!("00000000000000000000000000000000000000aa");
    let id = B256::repeat_byte(0x01);
    let secret = B256::repeat_byte(0x02);

    for topics in [
        vec![claimed_topic(), id],
        vec![claimed_topic(), id, secret, B256::ZERO],
    ] {
        let log = Log {
            inner: alloy::primitives::Log {
                address: contract,
                data: LogData::new_unchecked(topics, Bytes::new()),
            },
            ..Default::default()
        };
        assert!(matches!(
            check_claimed_log(&log, contract, id, secret),
            Err(RelayerError::ClaimLogWrongTopicLength)
        ));
    }
}

#[test]
fn rejects_claimed_log_mismatches() {
    let contract = address!("00000000000000000000000000000000000000aa");
    let other = address!("00000000000000000000000000000000000000ab");
    let id = B256::repeat_byte(0x01);
    let secret = B256::repeat_byte(0x02);

    let log = claimed_log(contract, id, secret);
    assert!(matches!(
        check_claimed_log(&log, other, id, secret),
        Err(RelayerError::ClaimLogInvalidContractAddr)
    ));
    assert!(matches!(
        check_claimed_log(&log, contract, B256::repeat_byte(0x03), secret),
        Err(RelayerError::ClaimLogWrongSwapID)
    ));
    assert!(matches!(
        check_claimed_log(&log, contract, id, B256::repeat_byte(0x04)),
        Err(RelayerError::ClaimLogWrongSecret)
    ));

    let wrong_event = Log {
        inner: alloy::primitives::Log {
            address: contract,
            data: LogData::new_unchecked(
                vec![keccak256(b"NotClaimed()"), id, secret],
                Bytes::new(),
            ),
        },
        ..Default::default()
    };
    assert!(matches!(
        check_claimed_log(&wrong_event, contract, id, secret),
        Err(RelayerError::ClaimLogWrongEvent)
    ));
}

#[test]
fn relay_claim_request_round_trips_through_json() {
    let request = RelayClaimRequest {
        swap_factory_address: address!("00000000000000000000000000000000000000aa"),
        swap: sample_swap(),
        secret: vec![0x5a; 32],
        signature: vec![0x6b; 65],
    };

    let json = serde_json::to_string(&request).unwrap();
    let decoded: RelayClaimRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded.swap_factory_address, request.swap_factory_address);
    assert_eq!(swap_id(&decoded.swap), swap_id(&request.swap));
    assert_eq!(decoded.secret, request.secret);
    assert_eq!(decoded.signature, request.signature);
}

#[test]
fn secret_b256_requires_exactly_32_bytes() {
    let mut request = RelayClaimRequest {
        swap_factory_address: Address::ZERO,
        swap: sample_swap(),
        secret: vec![0x5a; 32],
        signature: vec![0x6b; 65],
    };
    assert!(request.secret_b256().is_ok());

    request.secret = vec![0x5a; 31];
    assert!(matches!(
        request.secret_b256(),
        Err(RelayerError::InvalidSecretLength(31))
    ));
}
