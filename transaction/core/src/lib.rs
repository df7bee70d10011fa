// Copyright (c) 2020-2024 The Nocta Foundation

//! Nocta transaction types and the consensus binary codec.
//!
//! Transactions are serialized with the CryptoNote-family encoding: base-128
//! little-endian varints for every integer, one-byte discriminators for
//! input and output variants, and a length-prefixed extra field carrying TLV
//! records. The prefix hash (the per-input signing message) and the
//! transaction hash are Keccak-256 over the exact serialized bytes, so every
//! writer in this crate must be byte-stable under re-serialization.

mod codec;
mod error;
mod extra;
mod tx;

pub use codec::{write_varint, Reader, MAX_VARINT_LEN};
pub use error::CodecError;
pub use extra::{ExtraEntry, ExtraField, StakingRecord, EXTRA_TAG_STAKING, EXTRA_TAG_TX_PUBKEY};
pub use tx::{
    Transaction, TransactionPrefix, TxInput, TxOutput, INPUT_TAG_BASE, INPUT_TAG_KEY,
    OUTPUT_TAG_KEY,
};

/// 32-byte Keccak-256 digest, used for transaction and block hashes.
pub type Hash = [u8; 32];

/// The only transaction version this protocol has ever shipped.
pub const TX_VERSION: u64 = 1;

/// Discriminator value inside a staking extra record.
pub const STAKING_TAG_TYPE: u64 = 101;

/// Unlock-time values below this are block heights; at or above it they are
/// Unix timestamps in seconds.
pub const UNLOCK_TIME_HEIGHT_THRESHOLD: u64 = 500_000_000;
