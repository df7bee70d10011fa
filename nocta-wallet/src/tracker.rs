//! The UTXO tracker.
//!
//! Ingests parsed block data, classifies outputs and spends against the
//! wallet's spend-key set, enforces maturity and unlock-time policy, rolls
//! back on forks, and answers balance queries. All mutation happens through
//! [`OutputTracker::process_block`] and [`OutputTracker::rollback`]; queries
//! are synchronous reads of the current snapshot.

use std::collections::{BTreeMap, HashMap, HashSet};

use nct_transaction_core::Hash;
use tracing::{debug, warn};

use crate::{
    types::{
        Balances, BlockData, InputData, OutputRef, SyncedBlock, TransactionKind, TxData,
        WalletEvent, WalletOutput, WalletSnapshot, WalletSpend, WalletTransaction,
    },
    PRUNE_INTERVAL,
};

/// Maximum number of synced-block records retained.
const MAX_SYNCED_BLOCKS: usize = 1_000;

/// Number of most recent checkpoints always retained (and sent to the node).
const RECENT_CHECKPOINTS: usize = 50;

/// Checkpoints at heights divisible by this survive trimming forever.
const SPARSE_CHECKPOINT_INTERVAL: u64 = 5_000;

/// How a transaction was carried in the block envelope.
#[derive(Clone, Copy, Eq, PartialEq)]
enum TxClass {
    Coinbase,
    Regular,
    Staking,
}

/// Tracks outputs and spends for a set of spend keys.
pub struct OutputTracker {
    owned_keys: HashSet<[u8; 32]>,
    outputs: HashMap<OutputRef, WalletOutput>,
    spends: HashMap<OutputRef, WalletSpend>,
    synced_blocks: BTreeMap<u64, SyncedBlock>,
    checkpoints: BTreeMap<u64, Hash>,
    staking_tx_hashes: HashSet<Hash>,
    current_height: u64,
    fresh: bool,
    blocks_processed: u64,
    forks_recovered: u64,
    blocks_since_prune: u64,
}

impl OutputTracker {
    /// Track outputs for `owned_keys`, starting above `start_height`.
    pub fn new(owned_keys: impl IntoIterator<Item = [u8; 32]>, start_height: u64) -> Self {
        Self {
            owned_keys: owned_keys.into_iter().collect(),
            outputs: HashMap::new(),
            spends: HashMap::new(),
            synced_blocks: BTreeMap::new(),
            checkpoints: BTreeMap::new(),
            staking_tx_hashes: HashSet::new(),
            current_height: start_height,
            fresh: true,
            blocks_processed: 0,
            forks_recovered: 0,
            blocks_since_prune: 0,
        }
    }

    /// Height of the last ingested block.
    pub fn current_height(&self) -> u64 {
        self.current_height
    }

    /// Whether this tracker has never ingested a block nor carried over
    /// restored state.
    ///
    /// Tracked explicitly: a restored tracker has empty block and checkpoint
    /// maps but a meaningful `current_height`, so freshness cannot be
    /// inferred from those.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Total blocks processed over this tracker's lifetime.
    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed
    }

    /// Forks recovered via rollback.
    pub fn forks_recovered(&self) -> u64 {
        self.forks_recovered
    }

    /// Timestamp of the newest synced block, if any.
    pub fn last_block_timestamp(&self) -> Option<u64> {
        self.synced_blocks.values().next_back().map(|b| b.timestamp)
    }

    /// Ingest one block and return the events it produced, in order.
    ///
    /// A block at or below the current height is either an idempotent
    /// duplicate (same hash: ignored), a fork (different hash: rolled back,
    /// then processed), or a stale replay below retention (ignored).
    pub fn process_block(&mut self, block: &BlockData) -> Vec<WalletEvent> {
        if !self.is_fresh() && block.height <= self.current_height {
            match self.synced_blocks.get(&block.height) {
                Some(stored) if stored.hash == block.hash => return Vec::new(),
                Some(stored) => {
                    warn!(
                        height = block.height,
                        stored = %hex::encode(stored.hash),
                        incoming = %hex::encode(block.hash),
                        "fork detected, rolling back"
                    );
                    self.rollback(block.height);
                    self.forks_recovered += 1;
                }
                None => return Vec::new(),
            }
        }

        let mut events = vec![WalletEvent::BlockProcessed {
            height: block.height,
            hash: block.hash,
        }];

        let txs = Self::classed_transactions(block);

        // Output pass, in envelope order.
        let mut touched: Vec<Hash> = Vec::new();
        for (tx, class) in &txs {
            if *class == TxClass::Staking {
                self.staking_tx_hashes.insert(tx.hash);
            }
            for (index, output) in tx.outputs.iter().enumerate() {
                if !self.owned_keys.contains(&output.key) {
                    continue;
                }
                let output_ref = OutputRef {
                    tx_hash: tx.hash,
                    out_index: index as u32,
                };
                if self.outputs.contains_key(&output_ref) {
                    continue;
                }
                self.outputs.insert(
                    output_ref,
                    WalletOutput {
                        owner_key: output.key,
                        amount: output.amount,
                        block_height: block.height,
                        block_timestamp: block.timestamp,
                        tx_hash: tx.hash,
                        out_index: index as u32,
                        unlock_time: tx.unlock_time,
                        tx_pubkey: tx.tx_pubkey,
                        global_output_index: output.global_output_index,
                        is_coinbase: *class == TxClass::Coinbase,
                        is_staking_origin: *class == TxClass::Staking,
                        spent_at_height: None,
                    },
                );
                if !touched.contains(&tx.hash) {
                    touched.push(tx.hash);
                }
                events.push(WalletEvent::TransactionFound {
                    output: output_ref,
                    amount: output.amount,
                    block_height: block.height,
                });
            }
        }

        // Spend pass, in envelope order. Coinbase inputs mint, not spend.
        for (tx, class) in &txs {
            if *class == TxClass::Coinbase {
                continue;
            }
            for input in &tx.inputs {
                let Some(parent_ref) = self.match_spend(input) else {
                    continue;
                };
                let Some(output) = self.outputs.get_mut(&parent_ref) else {
                    continue;
                };
                if output.spent_at_height.is_some() {
                    continue;
                }
                output.spent_at_height = Some(block.height);
                let amount = output.amount;
                self.spends.insert(
                    parent_ref,
                    WalletSpend {
                        amount,
                        parent_tx_hash: parent_ref.tx_hash,
                        parent_out_index: parent_ref.out_index,
                        block_height: block.height,
                        block_timestamp: block.timestamp,
                        spending_tx_hash: tx.hash,
                    },
                );
                if !touched.contains(&tx.hash) {
                    touched.push(tx.hash);
                }
                events.push(WalletEvent::SpendFound {
                    parent: parent_ref,
                    amount,
                    block_height: block.height,
                    spending_tx_hash: tx.hash,
                });
            }
        }

        // Classification pass for every transaction that touched the wallet.
        for tx_hash in touched {
            events.push(WalletEvent::TransactionClassified {
                tx_hash,
                kind: self.classify(&tx_hash),
                block_height: block.height,
            });
        }

        self.synced_blocks.insert(
            block.height,
            SyncedBlock {
                height: block.height,
                hash: block.hash,
                timestamp: block.timestamp,
                tx_hashes: txs.iter().map(|(tx, _)| tx.hash).collect(),
            },
        );
        self.checkpoints.insert(block.height, block.hash);
        self.current_height = block.height;
        self.fresh = false;
        self.blocks_processed += 1;
        self.blocks_since_prune += 1;

        self.trim_synced_blocks();
        self.trim_checkpoints();
        if self.blocks_since_prune >= PRUNE_INTERVAL {
            self.prune_spent_outputs();
            self.blocks_since_prune = 0;
        }

        events
    }

    fn classed_transactions(block: &BlockData) -> Vec<(&TxData, TxClass)> {
        let mut txs = Vec::with_capacity(
            block.transactions.len() + block.staking_transactions.len() + 1,
        );
        if let Some(coinbase) = &block.coinbase {
            txs.push((coinbase, TxClass::Coinbase));
        }
        for tx in &block.transactions {
            txs.push((tx, TxClass::Regular));
        }
        for tx in &block.staking_transactions {
            txs.push((tx, TxClass::Staking));
        }
        txs
    }

    /// Locate the wallet output a key input spends.
    ///
    /// Exact identity is the only wire-accurate path and is always attempted
    /// first; the global-output-index and amount-FIFO fallbacks exist for
    /// servers that strip the exact reference.
    fn match_spend(&self, input: &InputData) -> Option<OutputRef> {
        let exact = OutputRef {
            tx_hash: input.tx_hash,
            out_index: input.out_index,
        };
        if self.outputs.contains_key(&exact) {
            return Some(exact);
        }

        if let Some(&global_index) = input.key_offsets.last() {
            let by_global = self
                .outputs
                .values()
                .filter(|o| o.spent_at_height.is_none())
                .find(|o| o.global_output_index == Some(global_index));
            if let Some(output) = by_global {
                return Some(output.output_ref());
            }
        }

        // Oldest unspent output of the exact amount.
        self.outputs
            .values()
            .filter(|o| o.spent_at_height.is_none() && o.amount == input.amount)
            .min_by_key(|o| (o.block_height, o.out_index))
            .map(|o| o.output_ref())
    }

    fn classify(&self, tx_hash: &Hash) -> TransactionKind {
        if self.staking_tx_hashes.contains(tx_hash) {
            return TransactionKind::Staking;
        }
        let mut received = 0u64;
        let mut spent = 0u64;
        let mut coinbase = false;
        for output in self.outputs.values() {
            if &output.tx_hash == tx_hash {
                received += output.amount;
                coinbase |= output.is_coinbase;
            }
        }
        for spend in self.spends.values() {
            if &spend.spending_tx_hash == tx_hash {
                spent += spend.amount;
            }
        }
        if coinbase {
            TransactionKind::Coinbase
        } else if spent > received {
            TransactionKind::Outgoing
        } else {
            TransactionKind::Incoming
        }
    }

    /// Roll back every record at or above `height`.
    ///
    /// Outputs created below `height` but spent at or above it become
    /// unspent again; checkpoints are trimmed in the same motion so the next
    /// sync request cannot reference the abandoned branch.
    pub fn rollback(&mut self, height: u64) {
        debug!(height, "rolling back wallet state");

        self.synced_blocks.split_off(&height);
        self.checkpoints.split_off(&height);
        self.outputs.retain(|_, o| o.block_height < height);
        self.spends.retain(|_, s| s.block_height < height);
        for output in self.outputs.values_mut() {
            if matches!(output.spent_at_height, Some(h) if h >= height) {
                output.spent_at_height = None;
            }
        }
        self.current_height = height.saturating_sub(1);
    }

    /// Advance to the reported network top without block data.
    ///
    /// Used when the node answers "synced" with a top block instead of a
    /// batch; the hash is kept as a checkpoint so a later fork at that
    /// height is still detectable.
    pub fn note_top_block(&mut self, height: u64, hash: Hash) {
        if height < self.current_height {
            return;
        }
        self.current_height = height;
        self.fresh = false;
        self.checkpoints.insert(height, hash);
        self.trim_checkpoints();
    }

    /// Drop all checkpoints; the next sync request starts a wider re-pull.
    pub fn clear_checkpoints(&mut self) {
        self.checkpoints.clear();
    }

    /// The newest checkpoints, height-descending, at most 50.
    pub fn checkpoint_hashes(&self) -> Vec<(u64, Hash)> {
        self.checkpoints
            .iter()
            .rev()
            .take(RECENT_CHECKPOINTS)
            .map(|(&height, &hash)| (height, hash))
            .collect()
    }

    /// Balance breakdown at the current height.
    ///
    /// `now` is the caller's wall clock, used only against timestamp-form
    /// unlock times.
    pub fn balances(&self, now: u64) -> Balances {
        let mut balances = Balances::default();
        for output in self.outputs.values() {
            if output.spent_at_height.is_some() {
                continue;
            }
            if output.is_spendable(self.current_height, now) {
                balances.available += output.amount;
            } else if output.is_staking_origin {
                balances.staking_locked += output.amount;
            } else {
                balances.locked += output.amount;
            }
        }
        balances
    }

    /// Spendable outputs at the current height, in deterministic order.
    pub fn spendable_outputs(&self, now: u64) -> Vec<&WalletOutput> {
        let mut spendable: Vec<&WalletOutput> = self
            .outputs
            .values()
            .filter(|o| o.is_spendable(self.current_height, now))
            .collect();
        spendable.sort_by_key(|o| (o.block_height, o.tx_hash, o.out_index));
        spendable
    }

    /// Every retained output, spent or not.
    pub fn all_outputs(&self) -> impl Iterator<Item = &WalletOutput> {
        self.outputs.values()
    }

    /// Look up one output by identity.
    pub fn output(&self, output_ref: &OutputRef) -> Option<&WalletOutput> {
        self.outputs.get(output_ref)
    }

    /// Classified history, newest block first, at most `limit` entries.
    pub fn transactions(&self, limit: usize) -> Vec<WalletTransaction> {
        struct Entry {
            block_height: u64,
            block_timestamp: u64,
            received: u64,
            spent: u64,
        }

        let mut by_tx: HashMap<Hash, Entry> = HashMap::new();
        for output in self.outputs.values() {
            let entry = by_tx.entry(output.tx_hash).or_insert(Entry {
                block_height: output.block_height,
                block_timestamp: output.block_timestamp,
                received: 0,
                spent: 0,
            });
            entry.received += output.amount;
        }
        for spend in self.spends.values() {
            let entry = by_tx.entry(spend.spending_tx_hash).or_insert(Entry {
                block_height: spend.block_height,
                block_timestamp: spend.block_timestamp,
                received: 0,
                spent: 0,
            });
            entry.spent += spend.amount;
        }

        let mut history: Vec<WalletTransaction> = by_tx
            .into_iter()
            .map(|(tx_hash, entry)| WalletTransaction {
                tx_hash,
                block_height: entry.block_height,
                block_timestamp: entry.block_timestamp,
                received: entry.received,
                spent: entry.spent,
                kind: self.classify(&tx_hash),
            })
            .collect();
        history.sort_by(|a, b| {
            b.block_height
                .cmp(&a.block_height)
                .then_with(|| a.tx_hash.cmp(&b.tx_hash))
        });
        history.truncate(limit);
        history
    }

    /// Export the serializable state.
    pub fn snapshot(&self) -> WalletSnapshot {
        let mut outputs: Vec<WalletOutput> = self.outputs.values().cloned().collect();
        outputs.sort_by_key(|o| (o.block_height, o.tx_hash, o.out_index));
        let mut spends: Vec<WalletSpend> = self.spends.values().cloned().collect();
        spends.sort_by_key(|s| (s.block_height, s.parent_tx_hash, s.parent_out_index));
        let mut staking_tx_hashes: Vec<Hash> = self.staking_tx_hashes.iter().copied().collect();
        staking_tx_hashes.sort();
        WalletSnapshot {
            outputs,
            spends,
            current_height: self.current_height,
            staking_tx_hashes,
        }
    }

    /// Rebuild a tracker from a snapshot.
    ///
    /// The restored tracker is never fresh: its `current_height` is
    /// meaningful, so duplicate/fork guards and the contiguity check stay
    /// armed even though the block and checkpoint maps start empty.
    pub fn restore(owned_keys: impl IntoIterator<Item = [u8; 32]>, snapshot: WalletSnapshot) -> Self {
        let mut tracker = Self::new(owned_keys, snapshot.current_height);
        tracker.fresh = false;
        tracker.outputs = snapshot
            .outputs
            .into_iter()
            .map(|o| (o.output_ref(), o))
            .collect();
        tracker.spends = snapshot
            .spends
            .into_iter()
            .map(|s| (s.parent_ref(), s))
            .collect();
        tracker.staking_tx_hashes = snapshot.staking_tx_hashes.into_iter().collect();
        tracker
    }

    fn trim_synced_blocks(&mut self) {
        while self.synced_blocks.len() > MAX_SYNCED_BLOCKS {
            self.synced_blocks.pop_first();
        }
    }

    fn trim_checkpoints(&mut self) {
        if self.checkpoints.len() <= RECENT_CHECKPOINTS {
            return;
        }
        let cutoff = self
            .checkpoints
            .keys()
            .rev()
            .nth(RECENT_CHECKPOINTS - 1)
            .copied()
            .unwrap_or(0);
        self.checkpoints
            .retain(|&height, _| height >= cutoff || height % SPARSE_CHECKPOINT_INTERVAL == 0);
    }

    fn prune_spent_outputs(&mut self) {
        let horizon = self.current_height.saturating_sub(PRUNE_INTERVAL);
        let stale: Vec<OutputRef> = self
            .outputs
            .iter()
            .filter(|(_, o)| matches!(o.spent_at_height, Some(h) if h < horizon))
            .map(|(r, _)| *r)
            .collect();
        if !stale.is_empty() {
            debug!(count = stale.len(), horizon, "pruning spent outputs");
        }
        for output_ref in stale {
            self.outputs.remove(&output_ref);
            self.spends.remove(&output_ref);
        }
    }
}
