use std::collections::HashMap;
use std::sync::Mutex;

use bigdecimal::BigDecimal;
use rand::rngs::OsRng;
use rand::RngCore;
use semver::Version;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

use crate::amounts::{validate_positive, ExchangeRate, NUM_MONERO_DECIMALS};
use crate::types::{is_hash_zero, EthAsset, Hash, ProvidesCoin};

/// Latest supported version of a serialized offer.
pub fn cur_offer_version() -> Version {
    Version::new(1, 0, 0)
}

#[derive(Debug, Error)]
pub enum OfferError {
    #[error(r#"required "version" field missing in offer"#)]
    VersionMissing,
    #[error("offer version {0} not supported, latest is {1}")]
    VersionUnsupported(Version, Version),
    #[error(r#""offerID" is not set"#)]
    IdNotSet,
    #[error(r#""exchangeRate" is not set"#)]
    ExchangeRateNil,
    #[error(r#""minAmount" must be less than or equal to "maxAmount""#)]
    MinGreaterThanMax,
    #[error("hash of offer fields does not match offer ID")]
    HashMismatch,
    #[error("offer validation failed: {0}")]
    Validation(#[from] crate::amounts::AmountError),
    #[error("required {0:?} field missing in offer")]
    FieldMissing(&'static str),
    #[error("malformed offer: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A swap offer: the maker provides between `min_amount` and `max_amount`
/// XMR at `exchange_rate` for the given ETH asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub version: Version,
    #[serde(rename = "offerID")]
    pub id: Hash,
    pub provides: ProvidesCoin,
    pub min_amount: BigDecimal,
    pub max_amount: BigDecimal,
    pub exchange_rate: ExchangeRate,
    pub eth_asset: EthAsset,
    pub nonce: u64,
}

impl Offer {
    /// Creates an offer with normalized amounts, a random nonce and a
    /// computed ID.
    pub fn new(
        provides: ProvidesCoin,
        min_amount: BigDecimal,
        max_amount: BigDecimal,
        exchange_rate: ExchangeRate,
        eth_asset: EthAsset,
    ) -> Result<Self, OfferError> {
        let mut nonce_bytes = [0u8; 8];
        OsRng.fill_bytes(&mut nonce_bytes);

        let mut offer = Offer {
            version: cur_offer_version(),
            id: Hash::ZERO,
            provides,
            // Normalize so that e.g. 0.10 and 0.1 hash identically.
            min_amount: min_amount.normalized(),
            max_amount: max_amount.normalized(),
            exchange_rate,
            eth_asset,
            nonce: u64::from_be_bytes(nonce_bytes),
        };
        offer.id = offer.hash();
        offer.validate()?;
        Ok(offer)
    }

    /// Deterministic offer ID: SHA3-256 over the canonical textual form of
    /// the fields.
    fn hash(&self) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update(self.version.to_string().as_bytes());
        hasher.update(self.provides.to_string().as_bytes());
        hasher.update(b",");
        hasher.update(self.min_amount.normalized().to_string().as_bytes());
        hasher.update(b",");
        hasher.update(self.max_amount.normalized().to_string().as_bytes());
        hasher.update(b",");
        hasher.update(self.exchange_rate.to_string().as_bytes());
        hasher.update(b",");
        hasher.update(self.eth_asset.to_string().as_bytes());
        hasher.update(b",");
        hasher.update(self.nonce.to_string().as_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        Hash::from(digest)
    }

    pub fn validate(&self) -> Result<(), OfferError> {
        if is_hash_zero(&self.id) {
            return Err(OfferError::IdNotSet);
        }
        validate_positive("minAmount", NUM_MONERO_DECIMALS, &self.min_amount)?;
        validate_positive("maxAmount", NUM_MONERO_DECIMALS, &self.max_amount)?;
        if self.min_amount > self.max_amount {
            return Err(OfferError::MinGreaterThanMax);
        }
        self.exchange_rate.validate()?;
        if self.id != self.hash() {
            return Err(OfferError::HashMismatch);
        }
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        !is_hash_zero(&self.id)
    }

    /// Whether an XMR amount falls within the advertised range.
    pub fn contains_amount(&self, xmr: &BigDecimal) -> bool {
        *xmr >= self.min_amount && *xmr <= self.max_amount
    }

    pub fn to_json(&self) -> Result<Vec<u8>, OfferError> {
        self.validate()?;
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserializes and validates an offer, gating on the version field
    /// before decoding the full blob.
    pub fn from_json(data: &[u8]) -> Result<Self, OfferError> {
        #[derive(Deserialize)]
        struct VersionProbe {
            version: Option<Version>,
        }

        let probe: VersionProbe = serde_json::from_slice(data)?;
        let version = probe.version.ok_or(OfferError::VersionMissing)?;
        if version > cur_offer_version() {
            return Err(OfferError::VersionUnsupported(version, cur_offer_version()));
        }

        let raw: OfferRaw = serde_json::from_slice(data)?;
        let offer = raw.into_offer(version)?;
        offer.validate()?;
        Ok(offer)
    }
}

impl std::fmt::Display for Offer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "OfferID:{} Provides:{} MinAmount:{} MaxAmount:{} ExchangeRate:{} EthAsset:{} Nonce:{}",
            self.id,
            self.provides,
            self.min_amount,
            self.max_amount,
            self.exchange_rate,
            self.eth_asset,
            self.nonce,
        )
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferRaw {
    #[serde(rename = "offerID", default)]
    id: Option<Hash>,
    provides: Option<ProvidesCoin>,
    min_amount: Option<BigDecimal>,
    max_amount: Option<BigDecimal>,
    exchange_rate: Option<ExchangeRate>,
    eth_asset: Option<EthAsset>,
    nonce: Option<u64>,
}

impl OfferRaw {
    fn into_offer(self, version: Version) -> Result<Offer, OfferError> {
        let id = match self.id {
            Some(id) if !is_hash_zero(&id) => id,
            _ => return Err(OfferError::IdNotSet),
        };
        let min_amount = self
            .min_amount
            .ok_or(OfferError::FieldMissing("minAmount"))?;
        let max_amount = self
            .max_amount
            .ok_or(OfferError::FieldMissing("maxAmount"))?;
        if min_amount > max_amount {
            return Err(OfferError::MinGreaterThanMax);
        }
        let exchange_rate = self.exchange_rate.ok_or(OfferError::ExchangeRateNil)?;

        Ok(Offer {
            version,
            id,
            provides: self.provides.ok_or(OfferError::FieldMissing("provides"))?,
            min_amount,
            max_amount,
            exchange_rate,
            eth_asset: self.eth_asset.unwrap_or(EthAsset::ETH),
            nonce: self.nonce.ok_or(OfferError::FieldMissing("nonce"))?,
        })
    }
}

impl<'de> Deserialize<'de> for Offer {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;
        let value = serde_json::Value::deserialize(deserializer)?;
        let data = serde_json::to_vec(&value).map_err(D::Error::custom)?;
        Offer::from_json(&data).map_err(D::Error::custom)
    }
}

/// Extra per-offer knobs supplied when the offer is made.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferExtra {
    #[serde(default)]
    pub use_relayer: bool,
}

/// In-memory registry of the offers this node is advertising.
pub struct OfferManager {
    offers: Mutex<HashMap<Hash, (Offer, OfferExtra)>>,
}

impl OfferManager {
    pub fn new() -> Self {
        Self {
            offers: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_offer(&self, offer: Offer, extra: OfferExtra) -> Result<(), OfferError> {
        offer.validate()?;
        self.offers
            .lock()
            .expect("offer registry lock poisoned")
            .insert(offer.id, (offer, extra));
        Ok(())
    }

    pub fn get_offer(&self, id: &Hash) -> Option<(Offer, OfferExtra)> {
        self.offers
            .lock()
            .expect("offer registry lock poisoned")
            .get(id)
            .cloned()
    }

    /// Removes and returns an offer, reserving it for a starting swap.
    pub fn take_offer(&self, id: &Hash) -> Option<(Offer, OfferExtra)> {
        self.offers
            .lock()
            .expect("offer registry lock poisoned")
            .remove(id)
    }

    pub fn delete_offer(&self, id: &Hash) {
        self.offers
            .lock()
            .expect("offer registry lock poisoned")
            .remove(id);
    }

    pub fn offers(&self) -> Vec<Offer> {
        self.offers
            .lock()
            .expect("offer registry lock poisoned")
            .values()
            .map(|(offer, _)| offer.clone())
            .collect()
    }
}

impl Default for OfferManager {
    fn default() -> Self {
        Self::new()
    }
}
