// Copyright (c) 2020-2024 The Nocta Foundation

use core::fmt;

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};

use crate::{hash_to_scalar, Error, PrivateKey, PublicKey};

/// The "image" of a private key `x`: `I = x * (hash_to_scalar(P) * G)`.
///
/// The hash-to-point step is approximated by a basepoint multiplication of
/// the hashed scalar, exactly as the reference implementation does. The image
/// uniquely tags a spending of the output key `P` on the wire.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct KeyImage {
    point: CompressedEdwardsY,
}

impl Ord for KeyImage {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl PartialOrd for KeyImage {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl KeyImage {
    /// Derive the key image for the keypair `(private, public)`.
    pub fn derive(private: &PrivateKey, public: &PublicKey) -> Self {
        let hp = hash_to_scalar(public.as_bytes());
        let exponent = hp * private.as_scalar();
        Self {
            point: EdwardsPoint::mul_base(&exponent).compress(),
        }
    }

    /// View the underlying 32-byte encoding.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.point.as_bytes()
    }

    /// Copy the underlying 32-byte encoding.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.point.to_bytes()
    }
}

impl TryFrom<&[u8]> for KeyImage {
    type Error = Error;

    fn try_from(src: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; 32] = src
            .try_into()
            .map_err(|_| Error::LengthMismatch(src.len(), 32))?;
        let point = CompressedEdwardsY(bytes);
        if point.decompress().is_none() {
            return Err(Error::InvalidCurvePoint);
        }
        Ok(Self { point })
    }
}

impl fmt::Debug for KeyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyImage({})", hex::encode(self.as_bytes()))
    }
}
