// Copyright (c) 2020-2024 The Nocta Foundation

//! The Schnorr-style signature scheme used for transaction inputs.
//!
//! Layout on the wire is `c ‖ s`, 64 bytes, both canonical scalars. The
//! challenge is `hash_to_scalar(message ‖ P ‖ R)` over the 96-byte
//! concatenation, and the response is `s = k − c·x` for nonce `k`.

use curve25519_dalek::{edwards::EdwardsPoint, scalar::Scalar};
use rand_core::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;

use crate::{hash_to_scalar, random_scalar, Error, PrivateKey, PublicKey};

/// Length in bytes of an encoded signature.
pub const SIGNATURE_LEN: usize = 64;

/// A Schnorr signature: challenge scalar `c` and response scalar `s`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Signature {
    c: Scalar,
    s: Scalar,
}

impl Signature {
    /// Assemble a signature from already-canonical scalars.
    pub fn from_scalars(c: Scalar, s: Scalar) -> Self {
        Self { c, s }
    }

    /// The challenge scalar.
    pub fn c(&self) -> &Scalar {
        &self.c
    }

    /// The response scalar.
    pub fn s(&self) -> &Scalar {
        &self.s
    }

    /// Encode as `c ‖ s`.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.c.to_bytes());
        bytes[32..].copy_from_slice(&self.s.to_bytes());
        bytes
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = Error;

    fn try_from(src: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; 64] = src
            .try_into()
            .map_err(|_| Error::LengthMismatch(src.len(), SIGNATURE_LEN))?;
        Self::try_from(bytes)
    }
}

impl TryFrom<[u8; 64]> for Signature {
    type Error = Error;

    fn try_from(bytes: [u8; 64]) -> Result<Self, Error> {
        let c = decode_canonical(&bytes[..32])?;
        let s = decode_canonical(&bytes[32..])?;
        Ok(Self { c, s })
    }
}

fn decode_canonical(src: &[u8]) -> Result<Scalar, Error> {
    let bytes: [u8; 32] = src.try_into().expect("scalar halves are 32 bytes");
    Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes)).ok_or(Error::NonCanonicalScalar)
}

/// The challenge scalar for `(message, P, R)`.
fn challenge(message: &[u8; 32], public: &PublicKey, r_bytes: &[u8; 32]) -> Scalar {
    let mut buf = [0u8; 96];
    buf[..32].copy_from_slice(message);
    buf[32..64].copy_from_slice(public.as_bytes());
    buf[64..].copy_from_slice(r_bytes);
    hash_to_scalar(&buf)
}

/// Sign `message` (a 32-byte digest) with the keypair `(public, private)`.
///
/// A fresh nonce is drawn from `rng` on every call; nonce reuse across
/// signatures is impossible by construction.
pub fn sign<R: RngCore + CryptoRng>(
    rng: &mut R,
    message: &[u8; 32],
    public: &PublicKey,
    private: &PrivateKey,
) -> Signature {
    let k = random_scalar(rng);
    let r_point = EdwardsPoint::mul_base(&k);
    let c = challenge(message, public, r_point.compress().as_bytes());
    let s = k - c * private.as_scalar();
    Signature { c, s }
}

/// Verify `signature` over `message` for `public`.
pub fn verify(message: &[u8; 32], public: &PublicKey, signature: &Signature) -> bool {
    // R' = s*G + c*P; the challenge recomputed over R' must equal c.
    let r_point = EdwardsPoint::vartime_double_scalar_mul_basepoint(
        &signature.c,
        public.point(),
        &signature.s,
    );
    let expected = challenge(message, public, r_point.compress().as_bytes());
    bool::from(expected.ct_eq(&signature.c))
}
