use blake2::{Blake2s256, Digest};
use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use thiserror::Error;

use crate::keys::{Secp256k1PublicKey, Secret};

const DLEQ_DOMAIN_TAG: &[u8; 4] = b"DLEQ";

/// Serialized proof length: R_ed(32) || R_secp(33) || z_ed(32) || z_secp(32).
pub const PROOF_SIZE: usize = 129;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid proof")]
    InvalidProof,
    #[error("invalid point encoding: {field}")]
    InvalidPoint { field: &'static str },
    #[error("small-order point: {field}")]
    SmallOrderPoint { field: &'static str },
    #[error("invalid scalar encoding: {field}")]
    InvalidScalar { field: &'static str },
    #[error("invalid length for {field}: expected {expected}, got {got}")]
    InvalidLength { field: &'static str, expected: usize, got: usize },
}

/// A cross-group DLEq proof: one nonce committed on both curves, one
/// transcript challenge, one response per group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof {
    r_ed: [u8; 32],
    r_secp: [u8; 33],
    z_ed: [u8; 32],
    z_secp: [u8; 32],
}

impl Proof {
    pub fn to_bytes(&self) -> [u8; PROOF_SIZE] {
        let mut out = [0u8; PROOF_SIZE];
        out[..32].copy_from_slice(&self.r_ed);
        out[32..65].copy_from_slice(&self.r_secp);
        out[65..97].copy_from_slice(&self.z_ed);
        out[97..].copy_from_slice(&self.z_secp);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != PROOF_SIZE {
            return Err(Error::InvalidLength {
                field: "proof",
                expected: PROOF_SIZE,
                got: bytes.len(),
            });
        }
        let mut proof = Self {
            r_ed: [0u8; 32],
            r_secp: [0u8; 33],
            z_ed: [0u8; 32],
            z_secp: [0u8; 32],
        };
        proof.r_ed.copy_from_slice(&bytes[..32]);
        proof.r_secp.copy_from_slice(&bytes[32..65]);
        proof.z_ed.copy_from_slice(&bytes[65..97]);
        proof.z_secp.copy_from_slice(&bytes[97..]);
        Ok(proof)
    }
}

/// A freshly sampled secret with its public points on both curves and the
/// proof binding them.
pub struct GeneratedKeys {
    pub secret: Secret,
    pub ed25519_public: [u8; 32],
    pub secp256k1_public: Secp256k1PublicKey,
    pub proof: Proof,
}

/// The two public points extracted from a verified proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedKeys {
    pub ed25519_public: [u8; 32],
    pub secp256k1_public: Secp256k1PublicKey,
}

/// Samples a secret scalar and proves that its ed25519 and secp256k1 public
/// points share it.
pub fn generate() -> GeneratedKeys {
    loop {
        if let Some(generated) = try_generate() {
            return generated;
        }
        // Only reachable if the secret or nonce reduced to zero.
    }
}

fn try_generate() -> Option<GeneratedKeys> {
    let secret = Secret::random();
    let s_ed = secret.ed25519_scalar();
    let s_secp = secret.secp256k1_scalar();

    let public_ed = (&ED25519_BASEPOINT_POINT * &s_ed).compress().to_bytes();
    let public_secp =
        Secp256k1PublicKey::from_point(&(k256::ProjectivePoint::GENERATOR * s_secp)).ok()?;

    let nonce = Secret::random();
    let k_ed = nonce.ed25519_scalar();
    let k_secp = nonce.secp256k1_scalar();

    let r_ed = (&ED25519_BASEPOINT_POINT * &k_ed).compress().to_bytes();
    let r_secp_point = k256::ProjectivePoint::GENERATOR * k_secp;
    let mut r_secp = [0u8; 33];
    let encoded = r_secp_point.to_affine().to_encoded_point(true);
    if encoded.as_bytes().len() != 33 {
        return None;
    }
    r_secp.copy_from_slice(encoded.as_bytes());

    let c = compute_challenge(&public_ed, &public_secp.compressed_bytes(), &r_ed, &r_secp);
    let c_ed = Scalar::from_bytes_mod_order(c);
    let c_secp = k256::Scalar::reduce(k256::U256::from_be_slice(&c));

    let z_ed = k_ed + c_ed * s_ed;
    let z_secp = k_secp + c_secp * s_secp;

    let mut z_secp_bytes = [0u8; 32];
    z_secp_bytes.copy_from_slice(&z_secp.to_bytes());

    Some(GeneratedKeys {
        secret,
        ed25519_public: public_ed,
        secp256k1_public: public_secp,
        proof: Proof {
            r_ed,
            r_secp,
            z_ed: z_ed.to_bytes(),
            z_secp: z_secp_bytes,
        },
    })
}

/// Verifies that the two public points commit to the same scalar, returning
/// them on success.
pub fn verify(
    proof: &Proof,
    secp256k1_public: &Secp256k1PublicKey,
    ed25519_public: &[u8; 32],
) -> Result<VerifiedKeys, Error> {
    let s_point = decompress_point(ed25519_public, "ed25519 public key")?;
    ensure_not_small_order(&s_point, "ed25519 public key")?;
    let r_ed_point = decompress_point(&proof.r_ed, "r_ed")?;
    ensure_not_small_order(&r_ed_point, "r_ed")?;

    let r_secp_point = Secp256k1PublicKey::from_bytes(&proof.r_secp)
        .map_err(|_| Error::InvalidPoint { field: "r_secp" })?
        .point();

    let c = compute_challenge(
        ed25519_public,
        &secp256k1_public.compressed_bytes(),
        &proof.r_ed,
        &proof.r_secp,
    );
    let c_ed = Scalar::from_bytes_mod_order(c);
    let c_secp = k256::Scalar::reduce(k256::U256::from_be_slice(&c));

    let z_ed: Scalar = Option::from(Scalar::from_canonical_bytes(proof.z_ed))
        .ok_or(Error::InvalidScalar { field: "z_ed" })?;
    let z_secp: k256::Scalar = Option::from(k256::Scalar::from_repr(proof.z_secp.into()))
        .ok_or(Error::InvalidScalar { field: "z_secp" })?;

    let ed_ok = &ED25519_BASEPOINT_POINT * &z_ed == r_ed_point + s_point * c_ed;
    let secp_ok = k256::ProjectivePoint::GENERATOR * z_secp
        == r_secp_point + secp256k1_public.point() * c_secp;

    if !(ed_ok && secp_ok) {
        return Err(Error::InvalidProof);
    }

    Ok(VerifiedKeys {
        ed25519_public: *ed25519_public,
        secp256k1_public: secp256k1_public.clone(),
    })
}

fn compute_challenge(
    public_ed: &[u8; 32],
    public_secp: &[u8; 33],
    r_ed: &[u8; 32],
    r_secp: &[u8; 33],
) -> [u8; 32] {
    let mut hasher = Blake2s256::new();
    hasher.update(DLEQ_DOMAIN_TAG);
    hasher.update(ED25519_BASEPOINT_POINT.compress().to_bytes());
    hasher.update(
        k256::ProjectivePoint::GENERATOR
            .to_affine()
            .to_encoded_point(true)
            .as_bytes(),
    );
    hasher.update(public_ed);
    hasher.update(public_secp);
    hasher.update(r_ed);
    hasher.update(r_secp);
    hasher.finalize().into()
}

fn decompress_point(bytes: &[u8; 32], field: &'static str) -> Result<EdwardsPoint, Error> {
    CompressedEdwardsY(*bytes)
        .decompress()
        .ok_or(Error::InvalidPoint { field })
}

fn ensure_not_small_order(point: &EdwardsPoint, field: &'static str) -> Result<(), Error> {
    if point.is_small_order() {
        return Err(Error::SmallOrderPoint { field });
    }
    Ok(())
}
