use std::str::FromStr;

use bigdecimal::BigDecimal;
use swap_engine::amounts::ExchangeRate;
use swap_engine::{
    EthAsset, Hash, ManagerError, ProvidesCoin, Status, StatusSender, SwapInfo, SwapManager,
};

fn info(id_byte: u8, status: Status) -> SwapInfo {
    let (sender, _rx) = StatusSender::channel();
    SwapInfo::new(
        Hash::repeat_byte(id_byte),
        ProvidesCoin::Xmr,
        BigDecimal::from_str("1").unwrap(),
        BigDecimal::from_str("0.05").unwrap(),
        ExchangeRate::new(BigDecimal::from_str("0.05").unwrap()),
        EthAsset::ETH,
        status,
        100,
        sender,
    )
}

#[test]
fn add_and_get_ongoing_swap() {
    let manager = SwapManager::new();
    let info = info(0x01, Status::KeysExchanged);
    manager.add_swap(&info).unwrap();

    let loaded = manager.get_ongoing_swap(&info.offer_id).unwrap();
    assert_eq!(loaded.status, Status::KeysExchanged);
    assert_eq!(manager.ongoing_swap_ids(), vec![info.offer_id]);
}

#[test]
fn rejects_duplicate_ongoing_swap() {
    let manager = SwapManager::new();
    let info = info(0x01, Status::KeysExchanged);
    manager.add_swap(&info).unwrap();

    let result = manager.add_swap(&info);
    assert!(matches!(result, Err(ManagerError::DuplicateSwap(id)) if id == info.offer_id));
}

#[test]
fn completion_moves_swap_and_is_idempotent() {
    let manager = SwapManager::new();
    let mut info = info(0x01, Status::KeysExchanged);
    manager.add_swap(&info).unwrap();

    info.status = Status::CompletedSuccess;
    manager.complete_ongoing_swap(&info);
    manager.complete_ongoing_swap(&info); // second completion is a no-op

    assert!(manager.get_ongoing_swap(&info.offer_id).is_none());
    assert_eq!(
        manager.get_past_swap(&info.offer_id).unwrap().status,
        Status::CompletedSuccess
    );

    // The ID is free again for a new swap of the same offer.
    let fresh = fresh_info();
    manager.add_swap(&fresh).unwrap();
}

fn fresh_info() -> SwapInfo {
    info(0x01, Status::KeysExchanged)
}

#[test]
fn update_refreshes_ongoing_snapshot() {
    let manager = SwapManager::new();
    let mut info = info(0x02, Status::KeysExchanged);
    manager.add_swap(&info).unwrap();

    info.status = Status::XmrLocked;
    manager.update_ongoing_swap(&info);
    assert_eq!(
        manager.get_ongoing_swap(&info.offer_id).unwrap().status,
        Status::XmrLocked
    );
}
