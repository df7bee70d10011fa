// Copyright (c) 2020-2024 The Nocta Foundation

//! Keccak-256 digests and the protocol's hash-to-scalar map.

use curve25519_dalek::scalar::Scalar;
use sha3::{Digest, Keccak256};

/// Compute the Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let digest = Keccak256::digest(data);
    digest.into()
}

/// Map arbitrary bytes to a scalar: Keccak-256, then reduce mod the group
/// order.
///
/// The 32-byte digest is zero-extended to 64 bytes before the wide reduction,
/// matching the reference implementation byte for byte.
pub fn hash_to_scalar(data: &[u8]) -> Scalar {
    let digest = keccak256(data);
    let mut wide = [0u8; 64];
    wide[..32].copy_from_slice(&digest);
    Scalar::from_bytes_mod_order_wide(&wide)
}
