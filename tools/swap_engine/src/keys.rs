use alloy::primitives::{keccak256, B256};
use dleq::{Proof, Secp256k1PublicKey, Secret};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use thiserror::Error;
use xmr_wallet::{CryptoError, PrivateKeyPair, PrivateSpendKey, PublicKey, PublicKeyPair};

#[derive(Debug, Error)]
pub enum KeysError {
    #[error(transparent)]
    Dleq(#[from] dleq::Error),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// One party's session keys: the swap secret, the Monero keypair derived
/// from it, the secp256k1 commitment and the DLEq proof binding them.
pub struct KeysAndProof {
    pub secret: Secret,
    pub dleq_proof: Proof,
    pub secp256k1_public: Secp256k1PublicKey,
    pub private_key_pair: PrivateKeyPair,
    pub public_key_pair: PublicKeyPair,
}

impl KeysAndProof {
    /// Contract-side form of the secret (byte-reversed spend key scalar).
    pub fn contract_secret(&self) -> B256 {
        B256::from(self.secret.to_contract_bytes())
    }
}

/// Generates the swap secret, its Monero keypair and the DLEq proof.
pub fn generate_keys_and_proof() -> Result<KeysAndProof, KeysError> {
    let generated = dleq::generate();
    let spend = PrivateSpendKey::from_bytes(*generated.secret.as_bytes())?;
    let private_key_pair = PrivateKeyPair::from_spend_key(spend);
    let public_key_pair = private_key_pair.public_key_pair();

    Ok(KeysAndProof {
        secret: generated.secret,
        dleq_proof: generated.proof,
        secp256k1_public: generated.secp256k1_public,
        private_key_pair,
        public_key_pair,
    })
}

/// The counterparty keys extracted from a verified DLEq proof.
pub struct VerifiedKeys {
    pub public_spend_key: PublicKey,
    pub secp256k1_public: Secp256k1PublicKey,
}

/// Verifies a counterparty's DLEq proof against the public points they sent.
pub fn verify_keys_and_proof(
    proof_bytes: &[u8],
    secp256k1_public: &Secp256k1PublicKey,
    public_spend_key: &PublicKey,
) -> Result<VerifiedKeys, KeysError> {
    let proof = Proof::from_bytes(proof_bytes)?;
    let verified = dleq::verify(&proof, secp256k1_public, &public_spend_key.to_compressed())?;
    Ok(VerifiedKeys {
        public_spend_key: PublicKey::from_compressed(verified.ed25519_public)?,
        secp256k1_public: verified.secp256k1_public,
    })
}

/// Recovers a counterparty's private spend key from the secret revealed in a
/// contract log (big-endian), reversing it back into the Monero convention.
pub fn spend_key_from_contract_secret(secret: B256) -> Result<PrivateSpendKey, KeysError> {
    let recovered = Secret::from_contract_bytes(secret.0)?;
    Ok(PrivateSpendKey::from_bytes(*recovered.as_bytes())?)
}

/// The 32-byte commitment to a secp256k1 public key stored by the swap
/// contract: keccak-256 of the uncompressed point coordinates.
pub fn secp256k1_commitment(key: &Secp256k1PublicKey) -> B256 {
    let point = key.point().to_affine().to_encoded_point(false);
    // Skip the 0x04 SEC1 prefix; the contract hashes x || y.
    keccak256(&point.as_bytes()[1..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_and_verify_round_trip() {
        let keys = generate_keys_and_proof().unwrap();
        let verified = verify_keys_and_proof(
            &keys.dleq_proof.to_bytes(),
            &keys.secp256k1_public,
            keys.public_key_pair.spend_key(),
        )
        .unwrap();
        assert_eq!(&verified.public_spend_key, keys.public_key_pair.spend_key());
        assert_eq!(verified.secp256k1_public, keys.secp256k1_public);
    }

    #[test]
    fn contract_secret_is_reversed_spend_key() {
        let keys = generate_keys_and_proof().unwrap();
        let mut contract_bytes = keys.contract_secret().0;
        contract_bytes.reverse();
        assert_eq!(contract_bytes, keys.private_key_pair.spend_key().to_bytes());
    }

    #[test]
    fn contract_secret_recovers_spend_key() {
        let keys = generate_keys_and_proof().unwrap();
        let recovered = spend_key_from_contract_secret(keys.contract_secret()).unwrap();
        assert_eq!(
            recovered.to_bytes(),
            keys.private_key_pair.spend_key().to_bytes()
        );
    }

    #[test]
    fn commitment_is_stable_per_key() {
        let keys = generate_keys_and_proof().unwrap();
        assert_eq!(
            secp256k1_commitment(&keys.secp256k1_public),
            secp256k1_commitment(&keys.secp256k1_public)
        );
        let other = generate_keys_and_proof().unwrap();
        assert_ne!(
            secp256k1_commitment(&keys.secp256k1_public),
            secp256k1_commitment(&other.secp256k1_public)
        );
    }
}
