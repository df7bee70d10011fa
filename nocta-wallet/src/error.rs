//! The caller-facing error taxonomy.
//!
//! Fork and ordering problems during sync never appear here: both are
//! recovered internally and show up only in the sync-state counters.

use thiserror::Error;

/// Errors surfaced by wallet operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum WalletError {
    /// Bad key material, a non-canonical scalar, or a signature that failed
    /// its mandatory post-generation self-check.
    #[error("invalid cryptographic encoding: {0}")]
    CryptoInvalidEncoding(String),

    /// Malformed consensus bytes.
    #[error("malformed transaction encoding: {0}")]
    CodecInvalid(#[from] nct_transaction_core::CodecError),

    /// The node RPC failed, timed out, or returned a non-OK status.
    #[error("node transport error: {0}")]
    Transport(String),

    /// The selector could not cover the requested amount plus fee.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Atomic units needed (target plus fee).
        required: u64,
        /// Atomic units currently spendable.
        available: u64,
    },

    /// No single preparation transaction holds the exact (amount, fee) pair.
    #[error("no precise staking outputs for amount {amount} and fee {fee}")]
    NoPreciseStakingOutputs {
        /// The required stake amount.
        amount: u64,
        /// The required staking-transaction fee.
        fee: u64,
    },

    /// The node refused a submitted transaction.
    #[error("transaction rejected by node: {0}")]
    Rejected(String),

    /// The operation was aborted because the stop flag was set.
    #[error("operation stopped")]
    Stopped,
}

impl From<nct_crypto_keys::Error> for WalletError {
    fn from(src: nct_crypto_keys::Error) -> Self {
        Self::CryptoInvalidEncoding(src.to_string())
    }
}

/// Convenience alias for wallet results.
pub type Result<T> = core::result::Result<T, WalletError>;
