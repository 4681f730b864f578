mod common;

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use swap_engine::{generate_keys_and_proof, Message, SendKeysMessage, Status, TakerSwap};
use tempfile::TempDir;

use common::*;

/// The maker's key-exchange reply.
fn maker_send_keys(keys: &swap_engine::KeysAndProof, xmr_amount: &str) -> SendKeysMessage {
    SendKeysMessage {
        offer_id: None,
        provided_amount: BigDecimal::from_str(xmr_amount).unwrap(),
        public_spend_key: *keys.public_key_pair.spend_key(),
        private_view_key: keys.private_key_pair.view_key().clone(),
        dleq_proof: keys.dleq_proof.to_bytes().to_vec(),
        secp256k1_public_key: keys.secp256k1_public.clone(),
        eth_address: Some(MAKER_ETH_ADDRESS),
    }
}

#[tokio::test]
async fn happy_path_locks_sets_ready_and_sweeps() {
    let eth = Arc::new(MockChain::new(TAKER_ETH_ADDRESS));
    let xmr = Arc::new(MockXmr::with_lock_at(2_000_005));
    let db_dir = TempDir::new().unwrap();
    let backend = build_backend(eth.clone(), xmr.clone(), db_dir.path());

    let offer = test_offer();
    let maker_keys = generate_keys_and_proof().unwrap();

    let (swap, handle, mut status_rx, opening) = TakerSwap::new_from_offer(
        backend.clone(),
        offer.clone(),
        BigDecimal::from_str("0.05").unwrap(),
    )
    .await
    .unwrap();

    let Message::SendKeys(opening) = opening else {
        panic!("taker must open with SendKeysMessage");
    };
    assert_eq!(opening.offer_id, Some(offer.id));
    assert!(opening.eth_address.is_none());

    tokio::spawn(swap.run());

    // Maker's keys arrive; we lock the ETH and answer with NotifyETHLocked.
    let reply = handle
        .keys_received(maker_send_keys(&maker_keys, "1"))
        .await
        .unwrap();
    let Message::NotifyEthLocked(notify) = reply else {
        panic!("taker must reply with NotifyETHLocked");
    };
    assert_eq!(notify.address, SWAP_FACTORY_ADDRESS);
    assert_eq!(notify.contract_swap.claimer, MAKER_ETH_ADDRESS);
    assert_eq!(notify.contract_swap.owner, TAKER_ETH_ADDRESS);
    assert_eq!(
        notify.contract_swap_id,
        eth_escrow::swap_id(&notify.contract_swap)
    );
    assert_eq!(eth.new_swaps.lock().unwrap().len(), 1);

    // The scripted XMR watcher confirms the maker's lock, so the machine
    // sets the contract ready.
    let seen = wait_for_status(&mut status_rx, Status::ContractReady).await;
    assert!(seen.contains(&Status::EthLocked));
    assert!(seen.contains(&Status::XmrLocked));
    assert_eq!(eth.set_ready_calls.lock().unwrap().len(), 1);

    // The maker claims, revealing their secret; we sweep the joint account.
    eth.inject_log(
        eth_escrow::claimed_topic(),
        vec![
            eth_escrow::claimed_topic(),
            notify.contract_swap_id,
            maker_keys.contract_secret(),
        ],
    )
    .await;

    wait_for_status(&mut status_rx, Status::CompletedSuccess).await;

    let sweeps = xmr.sweeps.lock().unwrap();
    assert_eq!(sweeps.len(), 1);
    let maker_pubs = xmr_wallet::PublicKeyPair::new(
        *maker_keys.public_key_pair.spend_key(),
        maker_keys.private_key_pair.view_key().public(),
    );
    let taker_pubs = xmr_wallet::PublicKeyPair::new(
        opening.public_spend_key,
        opening.private_view_key.public(),
    );
    let expected_joint = xmr_wallet::sum_spend_and_view_keys(&maker_pubs, &taker_pubs);
    assert_eq!(sweeps[0].keypair.public_key_pair(), expected_joint);
}

#[tokio::test]
async fn rejects_maker_keys_with_bad_proof() {
    let eth = Arc::new(MockChain::new(TAKER_ETH_ADDRESS));
    let xmr = Arc::new(MockXmr::new());
    let db_dir = TempDir::new().unwrap();
    let backend = build_backend(eth.clone(), xmr.clone(), db_dir.path());

    let (swap, handle, _status_rx, _opening) = TakerSwap::new_from_offer(
        backend,
        test_offer(),
        BigDecimal::from_str("0.05").unwrap(),
    )
    .await
    .unwrap();
    tokio::spawn(swap.run());

    let maker_keys = generate_keys_and_proof().unwrap();
    let other_keys = generate_keys_and_proof().unwrap();
    let mut message = maker_send_keys(&maker_keys, "1");
    // Proof from a different session does not bind these points.
    message.dleq_proof = other_keys.dleq_proof.to_bytes().to_vec();

    assert!(handle.keys_received(message).await.is_err());
    assert!(eth.new_swaps.lock().unwrap().is_empty());
}

#[tokio::test]
async fn rejects_amount_outside_offer_range() {
    let eth = Arc::new(MockChain::new(TAKER_ETH_ADDRESS));
    let xmr = Arc::new(MockXmr::new());
    let db_dir = TempDir::new().unwrap();
    let backend = build_backend(eth, xmr, db_dir.path());

    // 0.001 ETH buys 0.02 XMR, below the 0.1 XMR offer minimum.
    let result = TakerSwap::new_from_offer(
        backend,
        test_offer(),
        BigDecimal::from_str("0.001").unwrap(),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn exit_after_lock_refunds() {
    let eth = Arc::new(MockChain::new(TAKER_ETH_ADDRESS));
    // XMR lock never confirms.
    let xmr = Arc::new(MockXmr::new());
    let db_dir = TempDir::new().unwrap();
    let backend = build_backend(eth.clone(), xmr.clone(), db_dir.path());

    let maker_keys = generate_keys_and_proof().unwrap();
    let (swap, handle, mut status_rx, _opening) = TakerSwap::new_from_offer(
        backend,
        test_offer(),
        BigDecimal::from_str("0.05").unwrap(),
    )
    .await
    .unwrap();
    tokio::spawn(swap.run());

    handle
        .keys_received(maker_send_keys(&maker_keys, "1"))
        .await
        .unwrap();

    // The counterparty never locks XMR; exiting refunds our ETH.
    handle.exit().await.unwrap();
    wait_for_status(&mut status_rx, Status::CompletedRefund).await;

    let refunds = eth.refunds.lock().unwrap();
    assert_eq!(refunds.len(), 1);
}

#[tokio::test]
async fn exit_before_lock_aborts() {
    let eth = Arc::new(MockChain::new(TAKER_ETH_ADDRESS));
    let xmr = Arc::new(MockXmr::new());
    let db_dir = TempDir::new().unwrap();
    let backend = build_backend(eth.clone(), xmr, db_dir.path());

    let (swap, handle, mut status_rx, _opening) = TakerSwap::new_from_offer(
        backend,
        test_offer(),
        BigDecimal::from_str("0.05").unwrap(),
    )
    .await
    .unwrap();
    tokio::spawn(swap.run());

    handle.exit().await.unwrap();
    wait_for_status(&mut status_rx, Status::CompletedAbort).await;
    assert!(eth.new_swaps.lock().unwrap().is_empty());
    assert!(eth.refunds.lock().unwrap().is_empty());
}
