// Copyright (c) 2020-2024 The Nocta Foundation

//! Errors which can occur when encoding or decoding consensus bytes.

use displaydoc::Display;

/// An error which can occur when decoding the binary transaction format.
#[derive(Clone, Debug, Display, Eq, Hash, PartialEq)]
pub enum CodecError {
    /// Varint is longer than the 10-byte cap
    VarintTooLong,

    /// Varint encoding is not the minimal form
    NonCanonicalVarint,

    /// Varint value overflows u64
    VarintOverflow,

    /// Buffer ended before the value was complete
    Truncated,

    /// Unknown variant tag `{0:#04x}` in a required slot
    UnknownTag(u8),

    /// Extra field shorter than its declared length
    ExtraOverrun,

    /// Unknown staking record type `{0}`
    UnknownStakingType(u64),

    /// Malformed hex in `{0}`
    InvalidHex(&'static str),

    /// Signature count `{0}` does not match input count `{1}`
    SignatureCountMismatch(usize, usize),

    /// Trailing bytes after a complete value
    TrailingBytes,

    /// Invalid key material: {0}
    Key(nct_crypto_keys::Error),
}

impl std::error::Error for CodecError {}

impl From<nct_crypto_keys::Error> for CodecError {
    fn from(src: nct_crypto_keys::Error) -> Self {
        Self::Key(src)
    }
}
