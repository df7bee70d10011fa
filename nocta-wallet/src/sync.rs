//! The sync driver.
//!
//! Pulls block batches from an untrusted node using rolling checkpoints for
//! fork recovery, then switches to polling once caught up. The driver owns
//! no chain state of its own (every block lands in the tracker), but it
//! keeps the connection and error bookkeeping the sync-state query exposes.
//!
//! Height mismatches inside a batch split two ways: a block at or below the
//! tracker's height is a fork replay or duplicate and is handled by the
//! tracker's rollback path; a gap above the expected height clears the
//! checkpoints and aborts the batch so the next request re-pulls wider.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::{
    error::{Result, WalletError},
    node::{NodeTransport, SyncDataRequest},
    tracker::OutputTracker,
    types::{BlockData, WalletEvent},
};

/// Bound on the retained sync error list.
const MAX_SYNC_ERRORS: usize = 8;

/// Tunables for the sync loop.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Blocks requested per batch.
    pub blocks_per_batch: u64,
    /// Floor for the adaptive batch size.
    pub min_block_count: u64,
    /// Delay between empty-batch retries.
    pub retry_delay: Duration,
    /// Empty-batch retries before surfacing an error.
    pub max_empty_retries: u32,
    /// Delay between poll ticks once caught up.
    pub poll_interval: Duration,
    /// Per-request RPC timeout.
    pub rpc_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            blocks_per_batch: 20,
            min_block_count: 5,
            retry_delay: Duration::from_secs(2),
            max_empty_retries: 3,
            poll_interval: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(30),
        }
    }
}

/// A handle that can stop a running sync loop from outside the actor.
///
/// The underlying flag is monotonic for the lifetime of one sync run: once
/// set, every loop observes it at its next boundary and exits without
/// further mutation.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub(crate) fn new(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    /// Set the stop flag.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the flag is set.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot of sync progress, as returned by the sync-state query.
#[derive(Clone, Debug, Default)]
pub struct SyncState {
    /// Height of the last ingested block.
    pub current_height: u64,
    /// The network's top-block height, as last reported.
    pub network_height: u64,
    /// Whether the wallet has caught up to the network.
    pub is_synced: bool,
    /// Whether the node answered the most recent probe.
    pub connected: bool,
    /// Round-trip latency of the most recent probe.
    pub last_latency_ms: Option<u64>,
    /// Blocks processed over the tracker's lifetime.
    pub blocks_processed: u64,
    /// Forks recovered via rollback.
    pub forks_recovered: u64,
    /// Non-contiguous batches recovered via checkpoint clearing.
    pub ordering_violations: u64,
    /// Most recent transport errors, oldest first.
    pub recent_errors: Vec<String>,
}

/// Drives batch sync and polling against one node.
pub(crate) struct SyncDriver {
    config: SyncConfig,
    stop: Arc<AtomicBool>,
    network_height: u64,
    is_synced: bool,
    connected: bool,
    last_latency_ms: Option<u64>,
    errors: Vec<String>,
    ordering_violations: u64,
    error_seen: bool,
}

impl SyncDriver {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            stop: Arc::new(AtomicBool::new(false)),
            network_height: 0,
            is_synced: false,
            connected: false,
            last_latency_ms: None,
            errors: Vec::new(),
            ordering_violations: 0,
            error_seen: false,
        }
    }

    /// The cooperative stop flag; setting it halts the driver at the next
    /// batch boundary or poll tick.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Re-arm after a stop so sync can be driven again.
    pub fn reset_stop(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    /// Forget the synced state, forcing the next run back into batch mode.
    pub fn mark_unsynced(&mut self) {
        self.is_synced = false;
    }

    pub fn state(&self, tracker: &OutputTracker) -> SyncState {
        SyncState {
            current_height: tracker.current_height(),
            network_height: self.network_height,
            is_synced: self.is_synced,
            connected: self.connected,
            last_latency_ms: self.last_latency_ms,
            blocks_processed: tracker.blocks_processed(),
            forks_recovered: tracker.forks_recovered(),
            ordering_violations: self.ordering_violations,
            recent_errors: self.errors.clone(),
        }
    }

    fn record_error(&mut self, error: &WalletError) {
        warn!(%error, "sync error");
        if self.errors.len() >= MAX_SYNC_ERRORS {
            self.errors.remove(0);
        }
        self.errors.push(error.to_string());
        self.error_seen = true;
    }

    /// Probe `/info`, measuring latency and emitting the edge-triggered
    /// connection event on a state flip.
    pub async fn probe(
        &mut self,
        node: &dyn NodeTransport,
        events: &mut dyn FnMut(WalletEvent),
    ) -> Result<u64> {
        let start = Instant::now();
        let result = node.get_info(self.config.rpc_timeout).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(info) => {
                self.last_latency_ms = Some(latency_ms);
                if !self.connected {
                    self.connected = true;
                    events(WalletEvent::ConnectionStatusChanged {
                        connected: true,
                        latency_ms,
                    });
                }
                self.network_height = info.top_block_height();
                Ok(self.network_height)
            }
            Err(error) => {
                if self.connected {
                    self.connected = false;
                    events(WalletEvent::ConnectionStatusChanged {
                        connected: false,
                        latency_ms,
                    });
                }
                Err(error)
            }
        }
    }

    /// Pull batches until the node reports synced or the tracker reaches the
    /// network height.
    ///
    /// Observing the stop flag aborts with [`WalletError::Stopped`]; no
    /// further state mutation, event emission or RPC call happens after the
    /// check that saw it.
    pub async fn catch_up(
        &mut self,
        node: &dyn NodeTransport,
        tracker: &mut OutputTracker,
        events: &mut dyn FnMut(WalletEvent),
    ) -> Result<()> {
        let mut empty_retries = 0u32;
        let mut last_error: Option<WalletError> = None;

        loop {
            if self.is_stopped() {
                return Err(WalletError::Stopped);
            }

            let block_count = if self.error_seen {
                (self.config.blocks_per_batch / 2).max(self.config.min_block_count)
            } else {
                self.config.blocks_per_batch
            };

            let request = SyncDataRequest {
                block_hash_checkpoints: tracker
                    .checkpoint_hashes()
                    .into_iter()
                    .map(|(_, hash)| hex::encode(hash))
                    .collect(),
                start_height: Some(tracker.current_height()),
                start_timestamp: tracker.last_block_timestamp(),
                block_count: Some(block_count),
            };

            let response = match node
                .get_wallet_sync_data(request, self.config.rpc_timeout)
                .await
            {
                Ok(response) => response,
                Err(error) => {
                    self.record_error(&error);
                    empty_retries += 1;
                    if empty_retries > self.config.max_empty_retries {
                        return Err(error);
                    }
                    last_error = Some(error);
                    tokio::time::sleep(self.config.retry_delay).await;
                    continue;
                }
            };

            let blocks = response.items.unwrap_or_default();

            // Fast path: the node says we are at the tip.
            if response.synced == Some(true) || (blocks.is_empty() && response.top_block.is_some())
            {
                if let Some(top) = &response.top_block {
                    if let Ok(hash) = hex::decode(&top.hash) {
                        if let Ok(hash) = <[u8; 32]>::try_from(hash) {
                            tracker.note_top_block(top.height, hash);
                        }
                    }
                    self.network_height = self.network_height.max(top.height);
                }
                self.is_synced = true;
                debug!(height = tracker.current_height(), "sync idle at tip");
                return Ok(());
            }

            if blocks.is_empty() {
                empty_retries += 1;
                if empty_retries > self.config.max_empty_retries {
                    let error = last_error.unwrap_or_else(|| {
                        WalletError::Transport("node returned no blocks".to_string())
                    });
                    self.record_error(&error);
                    return Err(error);
                }
                tokio::time::sleep(self.config.retry_delay).await;
                continue;
            }
            empty_retries = 0;
            last_error = None;

            for wire_block in &blocks {
                if self.is_stopped() {
                    return Err(WalletError::Stopped);
                }

                let block = match BlockData::try_from(wire_block) {
                    Ok(block) => block,
                    Err(error) => {
                        self.record_error(&error);
                        break;
                    }
                };

                let expected = tracker.current_height() + 1;
                if !tracker.is_fresh() && block.height > expected {
                    warn!(
                        height = block.height,
                        expected, "non-contiguous block, clearing checkpoints"
                    );
                    tracker.clear_checkpoints();
                    self.ordering_violations += 1;
                    self.error_seen = true;
                    break;
                }

                for event in tracker.process_block(&block) {
                    events(event);
                }
            }

            if self.network_height > 0 && tracker.current_height() >= self.network_height {
                self.is_synced = true;
                info!(height = tracker.current_height(), "caught up with network");
                return Ok(());
            }
        }
    }

    /// Full sync loop: catch up, then poll, re-entering batch mode whenever
    /// the network advances. Runs until the stop flag is set, at which point
    /// it returns [`WalletError::Stopped`].
    pub async fn run(
        &mut self,
        node: &dyn NodeTransport,
        tracker: &mut OutputTracker,
        events: &mut dyn FnMut(WalletEvent),
    ) -> Result<()> {
        loop {
            if self.is_stopped() {
                return Err(WalletError::Stopped);
            }

            match self.probe(node, events).await {
                Ok(_) => {}
                Err(error) => {
                    self.record_error(&error);
                    tokio::time::sleep(self.config.retry_delay).await;
                    continue;
                }
            }

            if tracker.current_height() < self.network_height {
                self.is_synced = false;
                match self.catch_up(node, tracker, events).await {
                    Ok(()) => {}
                    Err(WalletError::Stopped) => return Err(WalletError::Stopped),
                    Err(error) => {
                        // Already recorded; surfaced through the sync state.
                        debug!(%error, "batch sync failed, will retry after poll interval");
                    }
                }
            } else {
                self.is_synced = true;
            }

            if self.is_stopped() {
                return Err(WalletError::Stopped);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
