//! Wallet-side views of chain data.

use nct_transaction_core::{Hash, UNLOCK_TIME_HEIGHT_THRESHOLD};
use serde::{Deserialize, Serialize};

use crate::{ATOMIC_UNITS_PER_NCT, MATURITY_BLOCKS};

/// Identity of one output within the chain.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct OutputRef {
    /// Hash of the producing transaction.
    pub tx_hash: Hash,
    /// Index of the output within that transaction.
    pub out_index: u32,
}

/// An output owned by this wallet.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct WalletOutput {
    /// The spend public key this output is locked to.
    pub owner_key: [u8; 32],
    /// Value in atomic units.
    pub amount: u64,
    /// Height of the block that produced it.
    pub block_height: u64,
    /// Timestamp of that block.
    pub block_timestamp: u64,
    /// Hash of the producing transaction.
    pub tx_hash: Hash,
    /// Output index within the producing transaction.
    pub out_index: u32,
    /// Height or timestamp before which the output cannot be spent.
    pub unlock_time: u64,
    /// The producing transaction's public key.
    pub tx_pubkey: [u8; 32],
    /// Chain-global output index, when the server supplied one.
    pub global_output_index: Option<u64>,
    /// Whether the producing transaction was a coinbase.
    pub is_coinbase: bool,
    /// Whether the producing transaction was a staking transaction.
    pub is_staking_origin: bool,
    /// Height of the observed spend, set at most once.
    pub spent_at_height: Option<u64>,
}

impl WalletOutput {
    /// The output's chain identity.
    pub fn output_ref(&self) -> OutputRef {
        OutputRef {
            tx_hash: self.tx_hash,
            out_index: self.out_index,
        }
    }

    /// Whether the output has reached spendable depth at `height`.
    pub fn is_mature(&self, height: u64) -> bool {
        self.block_height <= height.saturating_sub(MATURITY_BLOCKS)
    }

    /// Whether the unlock-time constraint has passed.
    ///
    /// Values below 500 000 000 are block heights, everything else is a Unix
    /// timestamp in seconds.
    pub fn is_unlocked(&self, height: u64, now: u64) -> bool {
        if self.unlock_time == 0 {
            return true;
        }
        if self.unlock_time < UNLOCK_TIME_HEIGHT_THRESHOLD {
            height >= self.unlock_time
        } else {
            now >= self.unlock_time
        }
    }

    /// Unspent, mature and unlocked.
    pub fn is_spendable(&self, height: u64, now: u64) -> bool {
        self.spent_at_height.is_none() && self.is_mature(height) && self.is_unlocked(height, now)
    }
}

/// A spend of one of this wallet's outputs, observed on chain.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct WalletSpend {
    /// Value of the spent output.
    pub amount: u64,
    /// Hash of the transaction that produced the spent output.
    pub parent_tx_hash: Hash,
    /// Output index within the producing transaction.
    pub parent_out_index: u32,
    /// Height of the block containing the spend.
    pub block_height: u64,
    /// Timestamp of that block.
    pub block_timestamp: u64,
    /// Hash of the spending transaction.
    pub spending_tx_hash: Hash,
}

impl WalletSpend {
    /// Identity of the spent output.
    pub fn parent_ref(&self) -> OutputRef {
        OutputRef {
            tx_hash: self.parent_tx_hash,
            out_index: self.parent_out_index,
        }
    }
}

/// A block the tracker has ingested.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SyncedBlock {
    /// Block height.
    pub height: u64,
    /// Block hash.
    pub hash: Hash,
    /// Block timestamp.
    pub timestamp: u64,
    /// Hashes of every transaction in the block.
    pub tx_hashes: Vec<Hash>,
}

/// Classification of a transaction touching this wallet.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TransactionKind {
    /// Block reward.
    Coinbase,
    /// Staking transaction (per the block envelope's staking array).
    Staking,
    /// Net value flowed in.
    Incoming,
    /// Net value flowed out.
    Outgoing,
}

/// One entry of the wallet's transaction history.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct WalletTransaction {
    /// Transaction hash.
    pub tx_hash: Hash,
    /// Height of the containing block.
    pub block_height: u64,
    /// Timestamp of the containing block.
    pub block_timestamp: u64,
    /// Atomic units received by this wallet.
    pub received: u64,
    /// Atomic units spent by this wallet.
    pub spent: u64,
    /// Classification.
    pub kind: TransactionKind,
}

/// Balance breakdown at the current height.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Balances {
    /// Spendable, non-staking-origin value.
    pub available: u64,
    /// Unspent non-staking value that is immature or still locked.
    pub locked: u64,
    /// Unspent staking-origin value that is immature or still locked.
    pub staking_locked: u64,
}

impl Balances {
    /// Sum of every unspent output.
    pub fn total(&self) -> u64 {
        self.available + self.locked + self.staking_locked
    }
}

/// Events emitted while processing chain data.
///
/// Within one block, events fire strictly in this order: `BlockProcessed`,
/// then each `TransactionFound` in output order, then each `SpendFound` in
/// input order, then one `TransactionClassified` per touched transaction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WalletEvent {
    /// A block was ingested.
    BlockProcessed {
        /// Block height.
        height: u64,
        /// Block hash.
        hash: Hash,
    },
    /// An output belonging to this wallet was found.
    TransactionFound {
        /// Identity of the found output.
        output: OutputRef,
        /// Value in atomic units.
        amount: u64,
        /// Height of the containing block.
        block_height: u64,
    },
    /// A spend of one of this wallet's outputs was found.
    SpendFound {
        /// Identity of the spent output.
        parent: OutputRef,
        /// Value in atomic units.
        amount: u64,
        /// Height of the containing block.
        block_height: u64,
        /// Hash of the spending transaction.
        spending_tx_hash: Hash,
    },
    /// A touched transaction was fully processed and classified.
    TransactionClassified {
        /// Transaction hash.
        tx_hash: Hash,
        /// Classification.
        kind: TransactionKind,
        /// Height of the containing block.
        block_height: u64,
    },
    /// Node connectivity flipped (edge-triggered).
    ConnectionStatusChanged {
        /// Whether the node is reachable.
        connected: bool,
        /// Round-trip latency of the probing call, in milliseconds.
        latency_ms: u64,
    },
}

/// Parsed block data fed to the tracker.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockData {
    /// Block height.
    pub height: u64,
    /// Block hash.
    pub hash: Hash,
    /// Block timestamp (Unix seconds).
    pub timestamp: u64,
    /// The coinbase transaction.
    pub coinbase: Option<TxData>,
    /// Regular transactions.
    pub transactions: Vec<TxData>,
    /// Staking-class transactions.
    pub staking_transactions: Vec<TxData>,
}

/// One transaction inside a parsed block.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TxData {
    /// Transaction hash.
    pub hash: Hash,
    /// The transaction's public key.
    pub tx_pubkey: [u8; 32],
    /// Unlock time carried by the prefix.
    pub unlock_time: u64,
    /// Outputs in order.
    pub outputs: Vec<OutputData>,
    /// Key inputs in order.
    pub inputs: Vec<InputData>,
}

/// One output inside a parsed block.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OutputData {
    /// The spend public key the output is locked to.
    pub key: [u8; 32],
    /// Value in atomic units.
    pub amount: u64,
    /// Chain-global output index, when supplied by the server.
    pub global_output_index: Option<u64>,
}

/// One key input inside a parsed block.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InputData {
    /// Value of the referenced output.
    pub amount: u64,
    /// Historical index list; the last entry doubles as a global index hint.
    pub key_offsets: Vec<u64>,
    /// Hash of the transaction that produced the referenced output.
    pub tx_hash: Hash,
    /// Output index within that transaction.
    pub out_index: u32,
}

/// Serializable tracker state (§ persisted state layout).
///
/// Restoring a snapshot yields the same balances and classifications as
/// replaying the chain from scratch.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct WalletSnapshot {
    /// Every retained wallet output.
    pub outputs: Vec<WalletOutput>,
    /// Every retained spend record.
    pub spends: Vec<WalletSpend>,
    /// Height of the last ingested block.
    pub current_height: u64,
    /// Hashes of every known staking transaction.
    pub staking_tx_hashes: Vec<Hash>,
}

/// Render an atomic amount as a decimal NCT string.
pub fn format_amount(atomic: u64) -> String {
    let whole = atomic / ATOMIC_UNITS_PER_NCT;
    let frac = atomic % ATOMIC_UNITS_PER_NCT;
    format!("{whole}.{frac:08} NCT")
}

/// Parse a decimal NCT string into atomic units.
///
/// Accepts an optional trailing `NCT` suffix and up to eight fractional
/// digits. Returns `None` on malformed input or overflow.
pub fn parse_amount(input: &str) -> Option<u64> {
    let trimmed = input.trim().trim_end_matches("NCT").trim_end();
    if trimmed.is_empty() {
        return None;
    }

    let (whole_str, frac_str) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if frac_str.len() > 8 || (!frac_str.is_empty() && !frac_str.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let whole: u64 = if whole_str.is_empty() {
        0
    } else {
        whole_str.parse().ok()?
    };
    let frac: u64 = if frac_str.is_empty() {
        0
    } else {
        let padded = format!("{frac_str:0<8}");
        padded.parse().ok()?
    };

    whole
        .checked_mul(ATOMIC_UNITS_PER_NCT)?
        .checked_add(frac)
}
