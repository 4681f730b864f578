mod common;

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use eth_escrow::SwapFactory;
use swap_engine::keys::spend_key_from_contract_secret;
use swap_engine::{
    generate_keys_and_proof, recover_ongoing_swaps, CounterpartyKeys, EthereumSwapInfo,
    OngoingOffer, Status,
};
use tempfile::TempDir;

use common::*;

/// Seeds the recovery DB the way a crashed maker at XMRLocked left it.
fn seed_crashed_swap(
    backend: &swap_engine::Backend,
    status: Status,
) -> (swap_engine::Offer, B256, swap_engine::KeysAndProof) {
    let offer = test_offer();
    let maker_keys = generate_keys_and_proof().unwrap();
    let taker_keys = generate_keys_and_proof().unwrap();

    let swap = SwapFactory::Swap {
        owner: TAKER_ETH_ADDRESS,
        claimer: MAKER_ETH_ADDRESS,
        pubKeyClaim: B256::repeat_byte(0x11),
        pubKeyRefund: B256::repeat_byte(0x22),
        timeout0: U256::from(unix_now() + 3_600),
        timeout1: U256::from(unix_now() + 7_200),
        asset: Address::ZERO,
        value: U256::from(10u64).pow(U256::from(17u64)),
        nonce: U256::from(7u64),
    };
    let swap_id = eth_escrow::swap_id(&swap);

    backend
        .recovery_db
        .put_ongoing_offer(
            &offer.id,
            &OngoingOffer {
                offer: offer.clone(),
                status,
                monero_start_height: 1_999_000,
                extra: Default::default(),
            },
        )
        .unwrap();
    backend
        .recovery_db
        .put_swap_private_key(&offer.id, maker_keys.private_key_pair.spend_key())
        .unwrap();
    backend
        .recovery_db
        .put_counterparty_swap_keys(
            &offer.id,
            &CounterpartyKeys {
                public_spend_key: *taker_keys.public_key_pair.spend_key(),
                private_view_key: taker_keys.private_key_pair.view_key().clone(),
            },
        )
        .unwrap();
    backend
        .recovery_db
        .put_ethereum_swap_info(
            &offer.id,
            &EthereumSwapInfo {
                start_block: 55,
                swap_id,
                swap,
                contract_address: SWAP_FACTORY_ADDRESS,
            },
        )
        .unwrap();

    (offer, swap_id, maker_keys)
}

#[tokio::test]
async fn resumes_xmr_locked_swap_and_claims() {
    let eth = Arc::new(MockChain::new(MAKER_ETH_ADDRESS));
    let xmr = Arc::new(MockXmr::new());
    let db_dir = TempDir::new().unwrap();
    let backend = build_backend(eth.clone(), xmr.clone(), db_dir.path());

    let (offer, swap_id, maker_keys) = seed_crashed_swap(&backend, Status::XmrLocked);

    let handles = recover_ongoing_swaps(backend.clone()).await.unwrap();
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].offer_id, offer.id);

    // Watchers re-attached at the recorded start block.
    eth.wait_for_filter(eth_escrow::ready_topic()).await;
    {
        let filters = eth.filters.lock().unwrap();
        assert!(filters
            .iter()
            .all(|spec| spec.from_block == 55 && spec.contract == SWAP_FACTORY_ADDRESS));
    }

    // The pending Ready event arrives; the resumed machine claims.
    eth.inject_log(
        eth_escrow::ready_topic(),
        vec![eth_escrow::ready_topic(), swap_id],
    )
    .await;

    let handle = handles.into_iter().next().unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle.done())
        .await
        .expect("recovered swap should complete");

    let claims = eth.claims.lock().unwrap();
    assert_eq!(claims.len(), 1);
    let revealed = spend_key_from_contract_secret(claims[0].1).unwrap();
    assert_eq!(
        revealed.to_bytes(),
        maker_keys.private_key_pair.spend_key().to_bytes()
    );

    assert_eq!(
        backend.swap_manager.get_past_swap(&offer.id).unwrap().status,
        Status::CompletedSuccess
    );
    assert!(backend
        .recovery_db
        .get_ongoing_offer(&offer.id)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn aborts_pre_lock_swaps_and_readds_offers() {
    let eth = Arc::new(MockChain::new(MAKER_ETH_ADDRESS));
    let xmr = Arc::new(MockXmr::new());
    let db_dir = TempDir::new().unwrap();
    let backend = build_backend(eth.clone(), xmr.clone(), db_dir.path());

    let (offer, _swap_id, _keys) = seed_crashed_swap(&backend, Status::KeysExchanged);

    let handles = recover_ongoing_swaps(backend.clone()).await.unwrap();
    assert!(handles.is_empty());

    // The swap was abandoned safely: records gone, offer advertised again.
    assert!(backend
        .recovery_db
        .get_ongoing_offer(&offer.id)
        .unwrap()
        .is_none());
    assert!(backend.offers.get_offer(&offer.id).is_some());
}

#[tokio::test]
async fn recovered_refund_reclaims_monero() {
    let eth = Arc::new(MockChain::new(MAKER_ETH_ADDRESS));
    let xmr = Arc::new(MockXmr::new());
    let db_dir = TempDir::new().unwrap();
    let backend = build_backend(eth.clone(), xmr.clone(), db_dir.path());

    let (offer, swap_id, _maker_keys) = seed_crashed_swap(&backend, Status::XmrLocked);
    let taker_secret_keys = generate_keys_and_proof().unwrap();

    let handles = recover_ongoing_swaps(backend.clone()).await.unwrap();
    assert_eq!(handles.len(), 1);

    eth.wait_for_filter(eth_escrow::refunded_topic()).await;
    eth.inject_log(
        eth_escrow::refunded_topic(),
        vec![
            eth_escrow::refunded_topic(),
            swap_id,
            taker_secret_keys.contract_secret(),
        ],
    )
    .await;

    let handle = handles.into_iter().next().unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle.done())
        .await
        .expect("recovered swap should complete");

    // The counterparty keys came back from the DB and the joint account was
    // swept from the recorded restore height.
    let sweeps = xmr.sweeps.lock().unwrap();
    assert_eq!(sweeps.len(), 1);
    assert_eq!(sweeps[0].restore_height, 1_999_000);
    assert_eq!(
        backend.swap_manager.get_past_swap(&offer.id).unwrap().status,
        Status::CompletedRefund
    );
}
