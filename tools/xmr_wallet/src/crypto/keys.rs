use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use monero_rpc::monero::{self, Network};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use zeroize::Zeroize;

use crate::types::CryptoError;

/// A Monero private spend key.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct PrivateSpendKey(Scalar);

impl PrivateSpendKey {
    pub fn from_scalar(scalar: Scalar) -> Self {
        Self(scalar)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        Option::from(Scalar::from_canonical_bytes(bytes))
            .map(Self)
            .ok_or(CryptoError::InvalidScalar)
    }

    pub fn as_scalar(&self) -> &Scalar {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(&ED25519_BASEPOINT_POINT * &self.0)
    }

    /// Derives the deterministic view key: Keccak-256 of the spend key bytes
    /// reduced into the scalar group, per the Monero wallet convention.
    pub fn view_key(&self) -> PrivateViewKey {
        let digest: [u8; 32] = Keccak256::digest(self.0.to_bytes()).into();
        PrivateViewKey(Scalar::from_bytes_mod_order(digest))
    }
}

impl std::fmt::Debug for PrivateSpendKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateSpendKey(..)")
    }
}

/// A Monero private view key. Unlike the spend key, this is shared with the
/// counterparty so both sides can watch the joint account.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct PrivateViewKey(Scalar);

impl PrivateViewKey {
    pub fn from_scalar(scalar: Scalar) -> Self {
        Self(scalar)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        Option::from(Scalar::from_canonical_bytes(bytes))
            .map(Self)
            .ok_or(CryptoError::InvalidScalar)
    }

    pub fn as_scalar(&self) -> &Scalar {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(&ED25519_BASEPOINT_POINT * &self.0)
    }
}

impl std::fmt::Debug for PrivateViewKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateViewKey(..)")
    }
}

/// A Monero public key (compressed Edwards point, small-order points
/// rejected on input).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(EdwardsPoint);

impl PublicKey {
    pub fn from_compressed(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let point = CompressedEdwardsY(bytes)
            .decompress()
            .ok_or(CryptoError::InvalidPoint)?;

        if point.is_small_order() {
            return Err(CryptoError::SmallOrderPoint);
        }

        Ok(Self(point))
    }

    pub fn point(&self) -> &EdwardsPoint {
        &self.0
    }

    pub fn to_compressed(&self) -> [u8; 32] {
        self.0.compress().to_bytes()
    }

    fn to_monero(self) -> Result<monero::PublicKey, CryptoError> {
        monero::PublicKey::from_slice(&self.to_compressed()).map_err(|_| CryptoError::InvalidPoint)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_compressed()))
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.to_compressed()))
    }
}

/// The spend/view private key pair backing one side of a swap account.
#[derive(Clone, Debug)]
pub struct PrivateKeyPair {
    spend: PrivateSpendKey,
    view: PrivateViewKey,
}

impl PrivateKeyPair {
    pub fn new(spend: PrivateSpendKey, view: PrivateViewKey) -> Self {
        Self { spend, view }
    }

    /// Builds the pair from a spend key alone, deriving the view key.
    pub fn from_spend_key(spend: PrivateSpendKey) -> Self {
        let view = spend.view_key();
        Self { spend, view }
    }

    pub fn spend_key(&self) -> &PrivateSpendKey {
        &self.spend
    }

    pub fn view_key(&self) -> &PrivateViewKey {
        &self.view
    }

    pub fn public_key_pair(&self) -> PublicKeyPair {
        PublicKeyPair {
            spend: self.spend.public(),
            view: self.view.public(),
        }
    }
}

/// The public half of a swap account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKeyPair {
    spend: PublicKey,
    view: PublicKey,
}

impl PublicKeyPair {
    pub fn new(spend: PublicKey, view: PublicKey) -> Self {
        Self { spend, view }
    }

    pub fn spend_key(&self) -> &PublicKey {
        &self.spend
    }

    pub fn view_key(&self) -> &PublicKey {
        &self.view
    }

    /// Standard address of this account on the given network.
    pub fn address(&self, network: Network) -> Result<monero::Address, CryptoError> {
        Ok(monero::Address::standard(
            network,
            self.spend.to_monero()?,
            self.view.to_monero()?,
        ))
    }
}

/// Combines both parties' public pairs into the joint swap account
/// (S_a + S_b, V_a + V_b). Funds locked there need both spend keys to move.
pub fn sum_spend_and_view_keys(a: &PublicKeyPair, b: &PublicKeyPair) -> PublicKeyPair {
    PublicKeyPair {
        spend: PublicKey(a.spend.0 + b.spend.0),
        view: PublicKey(a.view.0 + b.view.0),
    }
}

/// Combines both parties' private keys into the keypair that can sweep the
/// joint account: (s_a + s_b, v_a + v_b).
pub fn joint_private_key_pair(
    spend_a: &PrivateSpendKey,
    spend_b: &PrivateSpendKey,
    view_a: &PrivateViewKey,
    view_b: &PrivateViewKey,
) -> PrivateKeyPair {
    PrivateKeyPair {
        spend: PrivateSpendKey(spend_a.0 + spend_b.0),
        view: PrivateViewKey(view_a.0 + view_b.0),
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_compressed()))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = hex_32(deserializer)?;
        Self::from_compressed(bytes).map_err(serde::de::Error::custom)
    }
}

impl Serialize for PrivateSpendKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for PrivateSpendKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = hex_32(deserializer)?;
        Self::from_bytes(bytes).map_err(serde::de::Error::custom)
    }
}

impl Serialize for PrivateViewKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for PrivateViewKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = hex_32(deserializer)?;
        Self::from_bytes(bytes).map_err(serde::de::Error::custom)
    }
}

fn hex_32<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
    let s = String::deserialize(deserializer)?;
    let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
    bytes
        .try_into()
        .map_err(|_| serde::de::Error::custom("expected 32-byte hex string"))
}
