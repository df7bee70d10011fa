//! The wallet façade.
//!
//! Composes the tracker, the sync driver and a node transport behind the
//! caller-facing operation set. All state is owned here; concurrent callers
//! must serialize through one `Wallet` value.

use std::time::{SystemTime, UNIX_EPOCH};

use nct_transaction_core::Hash;
use rand::rngs::OsRng;
use tracing::info;

use crate::{
    builder::{
        build_stake_preparation, build_staking_transaction, build_transfer, Destination,
        InputCredentials, SpendKeypair,
    },
    error::{Result, WalletError},
    node::NodeTransport,
    selector,
    sync::{StopHandle, SyncConfig, SyncDriver, SyncState},
    tracker::OutputTracker,
    types::{WalletEvent, WalletOutput, WalletSnapshot, WalletTransaction},
    MIN_FEE,
};

/// A light-client wallet bound to one node.
pub struct Wallet {
    keys: Vec<SpendKeypair>,
    tracker: OutputTracker,
    node: Box<dyn NodeTransport>,
    driver: SyncDriver,
    config: SyncConfig,
    listener: Option<Box<dyn FnMut(WalletEvent) + Send>>,
}

impl Wallet {
    /// Create a wallet scanning for `keys`, starting above `start_height`.
    pub fn new(
        keys: Vec<SpendKeypair>,
        node: Box<dyn NodeTransport>,
        config: SyncConfig,
        start_height: u64,
    ) -> Self {
        let owned = keys.iter().map(|k| k.public().to_bytes());
        let tracker = OutputTracker::new(owned, start_height);
        Self {
            keys,
            tracker,
            node,
            driver: SyncDriver::new(config.clone()),
            config,
            listener: None,
        }
    }

    /// Restore a wallet from a previously exported snapshot.
    pub fn restore(
        keys: Vec<SpendKeypair>,
        node: Box<dyn NodeTransport>,
        config: SyncConfig,
        snapshot: WalletSnapshot,
    ) -> Self {
        let owned = keys.iter().map(|k| k.public().to_bytes());
        let tracker = OutputTracker::restore(owned, snapshot);
        Self {
            keys,
            tracker,
            node,
            driver: SyncDriver::new(config.clone()),
            config,
            listener: None,
        }
    }

    /// Register the event listener. Events fire during sync, in block order.
    pub fn on_event(&mut self, listener: impl FnMut(WalletEvent) + Send + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Catch up with the network once, then return.
    ///
    /// Transport failures that outlive the retry policy surface here;
    /// setting the stop flag mid-run surfaces as [`WalletError::Stopped`].
    pub async fn perform_sync(&mut self) -> Result<()> {
        self.driver.reset_stop();
        let node = self.node.as_ref();
        let tracker = &mut self.tracker;
        let listener = &mut self.listener;
        let mut events = |event: WalletEvent| {
            if let Some(listener) = listener {
                listener(event);
            }
        };
        self.driver.probe(node, &mut events).await?;
        self.driver.catch_up(node, tracker, &mut events).await
    }

    /// Run the continuous sync loop (batch mode, then polling) until the
    /// stop flag is set.
    pub async fn run_sync_loop(&mut self) -> Result<()> {
        self.driver.reset_stop();
        let node = self.node.as_ref();
        let tracker = &mut self.tracker;
        let listener = &mut self.listener;
        let mut events = |event: WalletEvent| {
            if let Some(listener) = listener {
                listener(event);
            }
        };
        self.driver.run(node, tracker, &mut events).await
    }

    /// Set the stop flag. The running sync loop halts at its next boundary;
    /// no further state mutation, event or RPC follows.
    pub fn stop_sync(&self) {
        info!("stop requested");
        self.stop_handle().stop();
    }

    /// A cloneable handle for stopping sync from outside the wallet actor
    /// (e.g. from an event listener or another task).
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.driver.stop_flag())
    }

    /// Discard all state at or above `height` and sync again from there.
    pub fn resync_from_height(&mut self, height: u64) {
        self.tracker.rollback(height);
        self.driver.mark_unsynced();
    }

    /// Current sync progress and connection health.
    pub fn sync_state(&self) -> SyncState {
        self.driver.state(&self.tracker)
    }

    /// Spendable outputs at the current height.
    pub fn available_outputs(&self) -> Vec<WalletOutput> {
        let now = unix_now();
        self.tracker
            .spendable_outputs(now)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Spendable balance in atomic units.
    pub fn available_balance(&self) -> u64 {
        self.tracker.balances(unix_now()).available
    }

    /// Unspent non-staking value that is immature or locked.
    pub fn locked_balance(&self) -> u64 {
        self.tracker.balances(unix_now()).locked
    }

    /// Unspent staking-origin value that is immature or locked.
    pub fn staking_locked_balance(&self) -> u64 {
        self.tracker.balances(unix_now()).staking_locked
    }

    /// Classified history, newest first.
    pub fn transactions(&self, limit: usize) -> Vec<WalletTransaction> {
        self.tracker.transactions(limit)
    }

    /// Whether a staking transaction for `(amount, fee)` can be finalized
    /// right now.
    pub fn has_precise_staking_outputs(&self, amount: u64, fee: u64) -> bool {
        let now = unix_now();
        let spendable = self.tracker.spendable_outputs(now);
        selector::has_precise_staking_outputs(&spendable, amount, fee)
    }

    /// Build, sign and submit a transfer. Returns the transaction hash.
    pub async fn send_transfer(
        &mut self,
        destinations: &[Destination],
        fee: Option<u64>,
    ) -> Result<Hash> {
        let fee = fee.unwrap_or(MIN_FEE);
        let target: u64 = destinations.iter().map(|d| d.amount).sum();
        let now = unix_now();

        let spendable = self.tracker.spendable_outputs(now);
        let selected = selector::select_transfer_inputs(&spendable, target, fee)?;
        let credentials = selected
            .iter()
            .map(|output| InputCredentials::resolve(output, &self.keys))
            .collect::<Result<Vec<_>>>()?;

        let change_key = *self.primary_key()?.public();
        let tx = build_transfer(&mut OsRng, &credentials, destinations, &change_key, fee, 0)?;

        self.submit(&tx.to_hex()).await?;
        let tx_hash = tx.hash();
        info!(tx_hash = %hex::encode(tx_hash), "transfer submitted");
        Ok(tx_hash)
    }

    /// Step one of staking: a self-transfer producing the exact
    /// `[amount, staking fee, change]` outputs the staking transaction will
    /// consume. Returns the preparation transaction hash.
    pub async fn prepare_stake(&mut self, amount: u64, fee: Option<u64>) -> Result<Hash> {
        let network_fee = fee.unwrap_or(MIN_FEE);
        let staking_fee = MIN_FEE;
        let now = unix_now();

        let spendable = self.tracker.spendable_outputs(now);
        let selected =
            selector::select_transfer_inputs(&spendable, amount + staking_fee, network_fee)?;
        let credentials = selected
            .iter()
            .map(|output| InputCredentials::resolve(output, &self.keys))
            .collect::<Result<Vec<_>>>()?;

        let own_key = *self.primary_key()?.public();
        let tx = build_stake_preparation(
            &mut OsRng,
            &credentials,
            &own_key,
            amount,
            staking_fee,
            network_fee,
        )?;

        self.submit(&tx.to_hex()).await?;
        let tx_hash = tx.hash();
        info!(tx_hash = %hex::encode(tx_hash), amount, "stake preparation submitted");
        Ok(tx_hash)
    }

    /// Step two of staking: consume the prepared pair and lock `amount` for
    /// `lock_days`. Returns the staking transaction hash.
    pub async fn finalize_stake(
        &mut self,
        prep_tx_hash: Hash,
        amount: u64,
        lock_days: u32,
    ) -> Result<Hash> {
        let staking_fee = MIN_FEE;
        let now = unix_now();

        let spendable = self.tracker.spendable_outputs(now);
        let [amount_output, fee_output] =
            selector::pick_staking_inputs(&spendable, amount, staking_fee, &prep_tx_hash)?;

        let staker = self.primary_key()?.clone();
        let tx = build_staking_transaction(
            &mut OsRng,
            InputCredentials::resolve(amount_output, &self.keys)?,
            InputCredentials::resolve(fee_output, &self.keys)?,
            &staker,
            amount,
            lock_days,
            self.tracker.current_height(),
        )?;

        self.submit(&tx.to_hex()).await?;
        let tx_hash = tx.hash();
        info!(
            tx_hash = %hex::encode(tx_hash),
            amount,
            lock_days,
            "staking transaction submitted"
        );
        Ok(tx_hash)
    }

    /// Export the serializable wallet state.
    pub fn snapshot(&self) -> WalletSnapshot {
        self.tracker.snapshot()
    }

    /// Direct access to the tracker, for callers composing their own views.
    pub fn tracker(&self) -> &OutputTracker {
        &self.tracker
    }

    fn primary_key(&self) -> Result<&SpendKeypair> {
        self.keys.first().ok_or_else(|| {
            WalletError::CryptoInvalidEncoding("wallet holds no spend keys".to_string())
        })
    }

    async fn submit(&self, tx_hex: &str) -> Result<()> {
        if self.driver.is_stopped() {
            return Err(WalletError::Stopped);
        }
        self.node
            .send_raw_transaction(tx_hex, self.config.rpc_timeout)
            .await?;
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
