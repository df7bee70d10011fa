// Copyright (c) 2020-2024 The Nocta Foundation

//! Spend key pairs on the Ed25519 curve.
//!
//! A `PrivateKey` is a canonical scalar, a `PublicKey` is a canonically
//! encoded curve point, and the two are always paired by `P = s * G`.

use core::fmt;

use curve25519_dalek::{
    edwards::{CompressedEdwardsY, EdwardsPoint},
    scalar::Scalar,
};
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, KEY_LEN};

/// Interpret 32 little-endian bytes as an integer and reduce it mod the
/// group order.
pub fn reduce32(bytes: [u8; 32]) -> Scalar {
    Scalar::from_bytes_mod_order(bytes)
}

/// Interpret 64 little-endian bytes as an integer and reduce it mod the
/// group order.
pub fn reduce64(bytes: [u8; 64]) -> Scalar {
    Scalar::from_bytes_mod_order_wide(&bytes)
}

/// Draw a uniformly distributed scalar from `rng`.
///
/// 64 bytes are drawn and reduced wide, so the bias of a single 32-byte
/// reduction never appears. Production callers pass an OS-backed RNG.
pub fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    let mut bytes = [0u8; 64];
    rng.fill_bytes(&mut bytes);
    let scalar = Scalar::from_bytes_mod_order_wide(&bytes);
    bytes.zeroize();
    scalar
}

/// A private spend key: a canonical scalar, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(Scalar);

impl PrivateKey {
    /// Draw a fresh private key from `rng`.
    pub fn from_random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(random_scalar(rng))
    }

    /// Wrap an already-reduced scalar.
    pub fn from_scalar(scalar: Scalar) -> Self {
        Self(scalar)
    }

    /// The underlying scalar.
    pub fn as_scalar(&self) -> &Scalar {
        &self.0
    }

    /// The 32-byte little-endian encoding.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl TryFrom<&[u8]> for PrivateKey {
    type Error = Error;

    fn try_from(src: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; 32] = src
            .try_into()
            .map_err(|_| Error::LengthMismatch(src.len(), KEY_LEN))?;
        let scalar = Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes))
            .ok_or(Error::NonCanonicalScalar)?;
        Ok(Self(scalar))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(<redacted>)")
    }
}

/// A public spend key: a validated, canonically encoded Edwards point.
#[derive(Clone, Copy)]
pub struct PublicKey {
    point: EdwardsPoint,
    compressed: CompressedEdwardsY,
}

impl PublicKey {
    /// View the canonical 32-byte encoding.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.compressed.as_bytes()
    }

    /// Copy the canonical 32-byte encoding.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.compressed.to_bytes()
    }

    /// The decompressed curve point.
    pub fn point(&self) -> &EdwardsPoint {
        &self.point
    }
}

impl From<&PrivateKey> for PublicKey {
    fn from(private: &PrivateKey) -> Self {
        let point = EdwardsPoint::mul_base(private.as_scalar());
        Self {
            point,
            compressed: point.compress(),
        }
    }
}

impl TryFrom<[u8; 32]> for PublicKey {
    type Error = Error;

    fn try_from(bytes: [u8; 32]) -> Result<Self, Error> {
        let compressed = CompressedEdwardsY(bytes);
        let point = compressed.decompress().ok_or(Error::InvalidCurvePoint)?;
        // Reject encodings that decompress but are not the canonical form of
        // the point they name.
        if point.compress() != compressed {
            return Err(Error::InvalidCurvePoint);
        }
        Ok(Self { point, compressed })
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = Error;

    fn try_from(src: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; 32] = src
            .try_into()
            .map_err(|_| Error::LengthMismatch(src.len(), KEY_LEN))?;
        Self::try_from(bytes)
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.compressed == other.compressed
    }
}

impl Eq for PublicKey {}

impl core::hash::Hash for PublicKey {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.compressed.as_bytes().hash(state)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.as_bytes()))
    }
}
