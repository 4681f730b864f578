use std::str::FromStr;

use bigdecimal::BigDecimal;
use swap_engine::amounts::ExchangeRate;
use swap_engine::{EthAsset, Offer, OfferError, OfferManager, ProvidesCoin};

fn offer(min: &str, max: &str, rate: &str) -> Offer {
    Offer::new(
        ProvidesCoin::Xmr,
        BigDecimal::from_str(min).unwrap(),
        BigDecimal::from_str(max).unwrap(),
        ExchangeRate::new(BigDecimal::from_str(rate).unwrap()),
        EthAsset::ETH,
    )
    .unwrap()
}

#[test]
fn new_offer_sets_id_from_fields() {
    let o = offer("0.1", "1", "0.05");
    assert!(o.is_set());
    assert!(o.validate().is_ok());
}

#[test]
fn round_trips_through_json() {
    let o = offer("0.1", "1", "0.05");
    let json = o.to_json().unwrap();
    let decoded = Offer::from_json(&json).unwrap();
    assert_eq!(decoded, o);
}

#[test]
fn trailing_zeros_do_not_change_the_id() {
    // 0.10 and 0.1 must hash identically; fresh nonces make the IDs differ
    // anyway, so compare through normalization of a single offer instead.
    let o = offer("0.10", "1.00", "0.050");
    assert_eq!(o.min_amount, BigDecimal::from_str("0.1").unwrap());
    assert!(o.validate().is_ok());
}

#[test]
fn min_equal_to_max_is_valid() {
    let o = offer("1", "1", "0.05");
    assert!(o.validate().is_ok());
    assert!(o.contains_amount(&BigDecimal::from_str("1").unwrap()));
    assert!(!o.contains_amount(&BigDecimal::from_str("1.000000000001").unwrap()));
}

#[test]
fn min_greater_than_max_is_rejected() {
    let result = Offer::new(
        ProvidesCoin::Xmr,
        BigDecimal::from_str("2").unwrap(),
        BigDecimal::from_str("1").unwrap(),
        ExchangeRate::new(BigDecimal::from_str("0.05").unwrap()),
        EthAsset::ETH,
    );
    assert!(matches!(result, Err(OfferError::MinGreaterThanMax)));
}

#[test]
fn decode_rejects_missing_version() {
    let o = offer("0.1", "1", "0.05");
    let mut value: serde_json::Value = serde_json::from_slice(&o.to_json().unwrap()).unwrap();
    value.as_object_mut().unwrap().remove("version");
    let result = Offer::from_json(&serde_json::to_vec(&value).unwrap());
    assert!(matches!(result, Err(OfferError::VersionMissing)));
}

#[test]
fn decode_rejects_newer_version() {
    let o = offer("0.1", "1", "0.05");
    let mut value: serde_json::Value = serde_json::from_slice(&o.to_json().unwrap()).unwrap();
    value["version"] = serde_json::json!("2.0.0");
    let result = Offer::from_json(&serde_json::to_vec(&value).unwrap());
    assert!(matches!(result, Err(OfferError::VersionUnsupported(_, _))));
}

#[test]
fn decode_rejects_missing_id() {
    let o = offer("0.1", "1", "0.05");
    let mut value: serde_json::Value = serde_json::from_slice(&o.to_json().unwrap()).unwrap();
    value.as_object_mut().unwrap().remove("offerID");
    let result = Offer::from_json(&serde_json::to_vec(&value).unwrap());
    assert!(matches!(result, Err(OfferError::IdNotSet)));
}

#[test]
fn decode_rejects_missing_exchange_rate() {
    let o = offer("0.1", "1", "0.05");
    let mut value: serde_json::Value = serde_json::from_slice(&o.to_json().unwrap()).unwrap();
    value.as_object_mut().unwrap().remove("exchangeRate");
    let result = Offer::from_json(&serde_json::to_vec(&value).unwrap());
    assert!(matches!(result, Err(OfferError::ExchangeRateNil)));
}

#[test]
fn decode_rejects_tampered_fields() {
    let o = offer("0.1", "1", "0.05");
    let mut value: serde_json::Value = serde_json::from_slice(&o.to_json().unwrap()).unwrap();
    value["maxAmount"] = serde_json::json!("2");
    let result = Offer::from_json(&serde_json::to_vec(&value).unwrap());
    assert!(matches!(result, Err(OfferError::HashMismatch)));
}

#[test]
fn manager_add_take_and_readd() {
    let manager = OfferManager::new();
    let o = offer("0.1", "1", "0.05");
    manager.add_offer(o.clone(), Default::default()).unwrap();
    assert!(manager.get_offer(&o.id).is_some());

    let (taken, _extra) = manager.take_offer(&o.id).unwrap();
    assert_eq!(taken.id, o.id);
    assert!(manager.get_offer(&o.id).is_none());

    manager.add_offer(taken, Default::default()).unwrap();
    assert_eq!(manager.offers().len(), 1);
}
