// Copyright (c) 2020-2024 The Nocta Foundation

//! Nocta key types and signing primitives.
//!
//! Everything here must stay bit-exact with the network's reference
//! implementation: scalars are 32-byte little-endian values reduced mod the
//! Ed25519 group order, points are compressed Edwards encodings, and the
//! hash-to-scalar path runs Keccak-256 output through a 64-byte wide
//! reduction. The Schnorr scheme and the key-image construction are part of
//! the wire protocol, not local conventions.

mod error;
mod hashes;
mod key_image;
mod keys;
mod signature;

pub use curve25519_dalek::scalar::Scalar;

pub use error::Error;
pub use hashes::{hash_to_scalar, keccak256};
pub use key_image::KeyImage;
pub use keys::{random_scalar, reduce32, reduce64, PrivateKey, PublicKey};
pub use signature::{sign, verify, Signature, SIGNATURE_LEN};

/// Length in bytes of a compressed public key or a private scalar.
pub const KEY_LEN: usize = 32;
