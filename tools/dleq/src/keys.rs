use curve25519_dalek::scalar::Scalar;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::proof::Error;

/// The swap secret: a 32-byte little-endian scalar below 2^252, canonical in
/// both the ed25519 and secp256k1 groups.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Secret([u8; 32]);

impl Secret {
    /// Samples a fresh secret with the top four bits cleared, so the same
    /// integer is a canonical scalar on both curves.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        bytes[31] &= 0x0f;
        Self(bytes)
    }

    /// Rebuilds a secret from its little-endian (Monero spend key) form.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, Error> {
        if bytes[31] & 0xf0 != 0 {
            return Err(Error::InvalidScalar { field: "secret" });
        }
        Ok(Self(bytes))
    }

    /// Rebuilds a secret from the big-endian form revealed on the Ethereum
    /// contract, reversing it back into the Monero convention.
    pub fn from_contract_bytes(mut bytes: [u8; 32]) -> Result<Self, Error> {
        bytes.reverse();
        Self::from_bytes(bytes)
    }

    /// Little-endian scalar bytes, as consumed by the Monero wallet.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Byte-reversed (big-endian) form, as accepted by the swap contract.
    pub fn to_contract_bytes(&self) -> [u8; 32] {
        let mut out = self.0;
        out.reverse();
        out
    }

    pub fn ed25519_scalar(&self) -> Scalar {
        Scalar::from_bytes_mod_order(self.0)
    }

    pub fn secp256k1_scalar(&self) -> k256::Scalar {
        use k256::elliptic_curve::ops::Reduce;
        // Below 2^252, so the reduction is a no-op.
        let be = self.to_contract_bytes();
        k256::Scalar::reduce(k256::U256::from_be_slice(&be))
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// Compressed secp256k1 public point (SEC1, 33 bytes).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Secp256k1PublicKey(k256::PublicKey);

impl Secp256k1PublicKey {
    pub fn from_public_key(key: k256::PublicKey) -> Self {
        Self(key)
    }

    pub fn from_point(point: &k256::ProjectivePoint) -> Result<Self, Error> {
        k256::PublicKey::from_affine(point.to_affine())
            .map(Self)
            .map_err(|_| Error::InvalidPoint { field: "secp256k1 public key" })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 33 {
            return Err(Error::InvalidLength {
                field: "secp256k1 public key",
                expected: 33,
                got: bytes.len(),
            });
        }
        k256::PublicKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| Error::InvalidPoint { field: "secp256k1 public key" })
    }

    pub fn point(&self) -> k256::ProjectivePoint {
        self.0.to_projective()
    }

    pub fn compressed_bytes(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out.copy_from_slice(self.0.to_encoded_point(true).as_bytes());
        out
    }
}

impl std::fmt::Display for Secp256k1PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.compressed_bytes()))
    }
}

impl Serialize for Secp256k1PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.compressed_bytes()))
    }
}

impl<'de> Deserialize<'de> for Secp256k1PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
