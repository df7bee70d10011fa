//! Nocta Light Client
//!
//! A wallet core that scans the chain for outputs belonging to a set of
//! spend keys, maintains a UTXO set with maturity and unlock rules, survives
//! forks via rolling-checkpoint resync, and builds, signs and submits binary
//! transactions, including the two-step staking flow.
//!
//! ## Trust model
//!
//! - Private keys never leave the wallet; all signing is local
//! - The node is untrusted: block data is re-validated against the wallet's
//!   own state, and forks are recovered from local checkpoints
//! - All state lives under a single logical actor; callers serialize access

pub mod builder;
pub mod error;
pub mod node;
pub mod selector;
pub mod sync;
pub mod tracker;
pub mod types;
pub mod wallet;

pub use builder::{Destination, InputCredentials, SpendKeypair};
pub use error::{Result, WalletError};
pub use node::{HttpNodeClient, NodeTransport};
pub use sync::{StopHandle, SyncConfig, SyncState};
pub use tracker::OutputTracker;
pub use types::{
    format_amount, parse_amount, Balances, BlockData, OutputRef, SyncedBlock, TransactionKind,
    WalletEvent, WalletOutput, WalletSnapshot, WalletSpend, WalletTransaction,
};
pub use wallet::Wallet;

/// Atomic units per whole NCT.
pub const ATOMIC_UNITS_PER_NCT: u64 = 100_000_000;

/// Minimum transaction fee in atomic units.
pub const MIN_FEE: u64 = 1_000;

/// Target seconds between blocks; used for stake lock arithmetic.
pub const BLOCK_TIME_SECONDS: u64 = 120;

/// Depth below the tip at which an output becomes spendable.
pub const MATURITY_BLOCKS: u64 = 10;

/// Spent outputs this many blocks behind the tip are pruned.
pub const PRUNE_INTERVAL: u64 = 2_880;
