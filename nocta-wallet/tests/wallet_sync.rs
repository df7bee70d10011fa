//! End-to-end wallet tests against a scripted mock node.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nct_crypto_keys::verify;
use nct_transaction_core::Transaction;
use nocta_wallet::{
    node::{
        InfoResponse, NodeTransport, SyncDataRequest, SyncDataResponse, WireBlock, WireOutput,
        WireTopBlock, WireTransaction,
    },
    Destination, Result, SpendKeypair, SyncConfig, TransactionKind, Wallet, WalletError,
    WalletEvent, MIN_FEE,
};
use rand::{rngs::StdRng, SeedableRng};

/// Shared state behind a scripted mock node.
#[derive(Default)]
struct MockState {
    infos: Mutex<VecDeque<InfoResponse>>,
    sync_responses: Mutex<VecDeque<SyncDataResponse>>,
    submitted: Mutex<Vec<String>>,
    reject_submissions: bool,
}

/// A node transport that replays scripted responses. Clones share state, so
/// tests can keep a handle while the wallet owns another.
#[derive(Clone, Default)]
struct MockNode(Arc<MockState>);

impl MockNode {
    fn rejecting() -> Self {
        Self(Arc::new(MockState {
            reject_submissions: true,
            ..MockState::default()
        }))
    }

    fn push_info(&self, height: u64) {
        self.0.infos.lock().unwrap().push_back(InfoResponse {
            height: height + 1,
            network_height: Some(height + 1),
            synced: Some(true),
        });
    }

    fn push_sync(&self, response: SyncDataResponse) {
        self.0.sync_responses.lock().unwrap().push_back(response);
    }

    fn submitted(&self) -> Vec<String> {
        self.0.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeTransport for MockNode {
    async fn get_info(&self, _timeout: Duration) -> Result<InfoResponse> {
        let mut infos = self.0.infos.lock().unwrap();
        match infos.len() {
            0 => Err(WalletError::Transport("mock offline".to_string())),
            1 => Ok(infos.front().cloned().unwrap()),
            _ => Ok(infos.pop_front().unwrap()),
        }
    }

    async fn get_wallet_sync_data(
        &self,
        _request: SyncDataRequest,
        _timeout: Duration,
    ) -> Result<SyncDataResponse> {
        let mut responses = self.0.sync_responses.lock().unwrap();
        Ok(responses.pop_front().unwrap_or(SyncDataResponse {
            status: Some("OK".to_string()),
            items: Some(vec![]),
            synced: Some(true),
            top_block: None,
        }))
    }

    async fn send_raw_transaction(&self, tx_as_hex: &str, _timeout: Duration) -> Result<String> {
        if self.0.reject_submissions {
            return Err(WalletError::Rejected("tx failed validation".to_string()));
        }
        self.0.submitted.lock().unwrap().push(tx_as_hex.to_string());
        Ok(hex::encode([0u8; 32]))
    }
}

fn keypair(seed: u64) -> SpendKeypair {
    let mut rng = StdRng::seed_from_u64(seed);
    SpendKeypair::from_random(&mut rng)
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        retry_delay: Duration::from_millis(10),
        poll_interval: Duration::from_millis(10),
        ..SyncConfig::default()
    }
}

fn coinbase_block(height: u64, hash_byte: u8, key: &SpendKeypair, amount: u64) -> WireBlock {
    WireBlock {
        height,
        hash: hex::encode([hash_byte; 32]),
        timestamp: height * 120,
        coinbase_tx: Some(WireTransaction {
            hash: hex::encode([hash_byte ^ 0xff; 32]),
            outputs: vec![WireOutput {
                key: hex::encode(key.public().to_bytes()),
                amount,
                global_output_index: None,
            }],
            inputs: vec![],
            tx_public_key: Some(hex::encode([0x77; 32])),
            unlock_time: 0,
        }),
        transactions: vec![],
        staking_txs: vec![],
    }
}

fn empty_block(height: u64, hash_byte: u8) -> WireBlock {
    WireBlock {
        height,
        hash: hex::encode([hash_byte; 32]),
        timestamp: height * 120,
        coinbase_tx: None,
        transactions: vec![],
        staking_txs: vec![],
    }
}

fn batch(blocks: Vec<WireBlock>) -> SyncDataResponse {
    SyncDataResponse {
        status: Some("OK".to_string()),
        items: Some(blocks),
        synced: None,
        top_block: None,
    }
}

/// Wrap a signed transaction into a wire block at `height`, crediting the
/// wallet with every output (transparent outputs carry the spend key).
fn block_with_tx(height: u64, hash_byte: u8, tx: &Transaction) -> WireBlock {
    let wire_tx = WireTransaction {
        hash: hex::encode(tx.hash()),
        outputs: tx
            .prefix
            .outputs
            .iter()
            .map(|o| WireOutput {
                key: hex::encode(o.key),
                amount: o.amount,
                global_output_index: None,
            })
            .collect(),
        inputs: tx
            .prefix
            .inputs
            .iter()
            .map(|input| match input {
                nct_transaction_core::TxInput::Key {
                    amount,
                    tx_hash,
                    out_index,
                    ..
                } => nocta_wallet::node::WireInput {
                    amount: *amount,
                    key_offsets: Some(vec![u64::from(*out_index)]),
                    value: None,
                    transaction_hash: hex::encode(tx_hash),
                    output_index: *out_index,
                    key_image: None,
                },
                nct_transaction_core::TxInput::Base { .. } => unreachable!("wallet txs spend keys"),
            })
            .collect(),
        tx_public_key: tx.prefix.extra.tx_pubkey().map(hex::encode),
        unlock_time: tx.prefix.unlock_time,
    };

    let mut block = empty_block(height, hash_byte);
    block.transactions = vec![wire_tx];
    block
}

#[tokio::test]
async fn sync_scans_batches_and_reports_tip() {
    let key = keypair(1);
    let node = MockNode::default();
    node.push_info(102);
    node.push_sync(batch(vec![
        coinbase_block(101, 1, &key, 1_000_000_000),
        empty_block(102, 2),
    ]));

    let mut wallet = Wallet::new(vec![key], Box::new(node.clone()), fast_config(), 100);
    let events = std::sync::Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    wallet.on_event(move |event| sink.lock().unwrap().push(event));

    wallet.perform_sync().await.unwrap();

    let state = wallet.sync_state();
    assert_eq!(state.current_height, 102);
    assert_eq!(state.network_height, 102);
    assert!(state.is_synced);
    assert!(state.connected);
    assert_eq!(state.blocks_processed, 2);

    // Immature at depth 1; locked balance carries the value.
    assert_eq!(wallet.available_balance(), 0);
    assert_eq!(wallet.locked_balance(), 1_000_000_000);

    // Event order within the block: processed, found, classified.
    let events = events.lock().unwrap();
    assert!(matches!(
        events[0],
        WalletEvent::ConnectionStatusChanged { connected: true, .. }
    ));
    assert!(matches!(events[1], WalletEvent::BlockProcessed { height: 101, .. }));
    assert!(matches!(
        events[2],
        WalletEvent::TransactionFound { amount: 1_000_000_000, .. }
    ));
    assert!(matches!(
        events[3],
        WalletEvent::TransactionClassified { kind: TransactionKind::Coinbase, .. }
    ));
    assert!(matches!(events[4], WalletEvent::BlockProcessed { height: 102, .. }));
}

#[tokio::test]
async fn synced_response_fast_forwards_to_top_block() {
    let key = keypair(2);
    let node = MockNode::default();
    node.push_info(500);
    node.push_sync(SyncDataResponse {
        status: Some("OK".to_string()),
        items: Some(vec![]),
        synced: Some(true),
        top_block: Some(WireTopBlock {
            hash: hex::encode([9u8; 32]),
            height: 500,
        }),
    });

    let mut wallet = Wallet::new(vec![key], Box::new(node.clone()), fast_config(), 100);
    wallet.perform_sync().await.unwrap();

    let state = wallet.sync_state();
    assert_eq!(state.current_height, 500);
    assert!(state.is_synced);
}

#[tokio::test(start_paused = true)]
async fn empty_batches_exhaust_retries_into_transport_error() {
    let key = keypair(3);
    let node = MockNode::default();
    node.push_info(200);
    for _ in 0..4 {
        node.push_sync(SyncDataResponse {
            status: Some("OK".to_string()),
            items: Some(vec![]),
            synced: None,
            top_block: None,
        });
    }
    // Four empties: the limit of three retries is exceeded before the
    // exhausted-queue default ("synced") could be reached.
    let mut wallet = Wallet::new(vec![key], Box::new(node.clone()), fast_config(), 100);

    let err = wallet.perform_sync().await.unwrap_err();
    assert!(matches!(err, WalletError::Transport(_)));

    let state = wallet.sync_state();
    assert!(!state.recent_errors.is_empty());
}

#[tokio::test]
async fn stop_flag_halts_between_blocks() {
    let key = keypair(4);
    let node = MockNode::default();
    node.push_info(300);
    node.push_sync(batch(vec![
        coinbase_block(101, 1, &key, 500),
        coinbase_block(102, 2, &key, 600),
        coinbase_block(103, 3, &key, 700),
    ]));

    let mut wallet = Wallet::new(vec![key], Box::new(node.clone()), fast_config(), 100);
    let stop = wallet.stop_handle();
    wallet.on_event(move |event| {
        if matches!(event, WalletEvent::BlockProcessed { height: 101, .. }) {
            stop.stop();
        }
    });

    let err = wallet.perform_sync().await.unwrap_err();
    assert_eq!(err, WalletError::Stopped);

    // Only the first block mutated state; nothing after the stop check.
    assert_eq!(wallet.sync_state().current_height, 101);
    assert_eq!(wallet.sync_state().blocks_processed, 1);
}

#[tokio::test]
async fn fork_replay_rolls_back_and_follows_the_new_branch() {
    let key = keypair(5);
    let node = MockNode::default();
    node.push_info(102);
    node.push_info(102);
    node.push_sync(batch(vec![
        coinbase_block(101, 0x0a, &key, 100),
        coinbase_block(102, 0x0b, &key, 200),
    ]));
    // Second sync: the node switched branches and replays from height 101.
    node.push_sync(batch(vec![
        coinbase_block(101, 0x1a, &key, 400),
        coinbase_block(102, 0x1b, &key, 800),
    ]));

    let mut wallet = Wallet::new(vec![key], Box::new(node.clone()), fast_config(), 100);
    wallet.perform_sync().await.unwrap();
    assert_eq!(wallet.locked_balance(), 300);

    wallet.perform_sync().await.unwrap();
    let state = wallet.sync_state();
    assert_eq!(state.current_height, 102);
    assert_eq!(state.forks_recovered, 1);
    assert_eq!(wallet.locked_balance(), 1_200);
}

#[tokio::test]
async fn send_transfer_builds_a_verifiable_transaction() {
    let key = keypair(6);
    let recipient = keypair(7);
    let node = MockNode::default();
    node.push_info(115);
    node.push_sync(batch(
        std::iter::once(coinbase_block(101, 1, &key, 10_000_000))
            .chain((102..=115).map(|h| empty_block(h, h as u8)))
            .collect(),
    ));

    let mut wallet = Wallet::new(vec![key.clone()], Box::new(node.clone()), fast_config(), 100);
    wallet.perform_sync().await.unwrap();
    assert_eq!(wallet.available_balance(), 10_000_000);

    let destinations = [Destination::new(&recipient.public().to_bytes(), 4_000_000).unwrap()];
    wallet.send_transfer(&destinations, None).await.unwrap();

    let submitted = node.submitted();
    assert_eq!(submitted.len(), 1);
    let tx = Transaction::parse(&hex::decode(&submitted[0]).unwrap()).unwrap();

    // Destination first, change back to self, minus the default fee.
    assert_eq!(tx.prefix.outputs[0].amount, 4_000_000);
    assert_eq!(tx.prefix.outputs[0].key, recipient.public().to_bytes());
    assert_eq!(tx.prefix.outputs[1].amount, 10_000_000 - 4_000_000 - MIN_FEE);
    assert_eq!(tx.prefix.outputs[1].key, key.public().to_bytes());

    // Every signature verifies against the re-serialized prefix hash.
    let prefix_hash = nct_crypto_keys::keccak256(&tx.prefix.to_bytes());
    for signature in &tx.signatures {
        assert!(verify(&prefix_hash, key.public(), signature));
    }
}

#[tokio::test]
async fn insufficient_funds_reports_amounts() {
    let key = keypair(8);
    let node = MockNode::default();
    node.push_info(115);
    node.push_sync(batch(
        std::iter::once(coinbase_block(101, 1, &key, 5_000))
            .chain((102..=115).map(|h| empty_block(h, h as u8)))
            .collect(),
    ));

    let mut wallet = Wallet::new(vec![key.clone()], Box::new(node.clone()), fast_config(), 100);
    wallet.perform_sync().await.unwrap();

    let recipient = keypair(9);
    let destinations = [Destination::new(&recipient.public().to_bytes(), 100_000).unwrap()];
    let err = wallet.send_transfer(&destinations, None).await.unwrap_err();
    assert_eq!(
        err,
        WalletError::InsufficientFunds {
            required: 100_000 + MIN_FEE,
            available: 5_000,
        }
    );
}

#[tokio::test]
async fn rejected_submission_surfaces_the_node_error() {
    let key = keypair(10);
    let node = MockNode::rejecting();
    node.push_info(115);
    node.push_sync(batch(
        std::iter::once(coinbase_block(101, 1, &key, 10_000_000))
            .chain((102..=115).map(|h| empty_block(h, h as u8)))
            .collect(),
    ));

    let mut wallet = Wallet::new(vec![key.clone()], Box::new(node.clone()), fast_config(), 100);
    wallet.perform_sync().await.unwrap();

    let recipient = keypair(11);
    let destinations = [Destination::new(&recipient.public().to_bytes(), 1_000_000).unwrap()];
    let err = wallet.send_transfer(&destinations, None).await.unwrap_err();
    assert!(matches!(err, WalletError::Rejected(_)));
}

#[tokio::test]
async fn staking_two_step_flow() {
    let key = keypair(12);
    let node = MockNode::default();
    node.push_info(115);
    node.push_sync(batch(
        std::iter::once(coinbase_block(101, 1, &key, 10_000_000_000))
            .chain((102..=115).map(|h| empty_block(h, h as u8)))
            .collect(),
    ));

    let mut wallet = Wallet::new(vec![key.clone()], Box::new(node.clone()), fast_config(), 100);
    wallet.perform_sync().await.unwrap();

    // Step one: the preparation self-transfer.
    let prep_hash = wallet.prepare_stake(5_000_000_000, None).await.unwrap();
    let submitted = node.submitted();
    let prep_tx = Transaction::parse(&hex::decode(&submitted[0]).unwrap()).unwrap();
    assert_eq!(prep_tx.hash(), prep_hash);

    let amounts: Vec<u64> = prep_tx.prefix.outputs.iter().map(|o| o.amount).collect();
    assert_eq!(
        amounts,
        vec![5_000_000_000, MIN_FEE, 10_000_000_000 - 5_000_000_000 - 2 * MIN_FEE]
    );

    // Confirm the preparation and let it mature.
    {
        node.push_info(130);
        node.push_sync(batch(
            std::iter::once(block_with_tx(116, 0x16, &prep_tx))
                .chain((117..=130).map(|h| empty_block(h, h as u8)))
                .collect(),
        ));
    }
    wallet.perform_sync().await.unwrap();
    assert!(wallet.has_precise_staking_outputs(5_000_000_000, MIN_FEE));

    // Step two: the staking transaction.
    let stake_hash = wallet
        .finalize_stake(prep_hash, 5_000_000_000, 30)
        .await
        .unwrap();
    let submitted = node.submitted();
    let stake_tx = Transaction::parse(&hex::decode(&submitted[1]).unwrap()).unwrap();
    assert_eq!(stake_tx.hash(), stake_hash);

    // Exactly the prepared pair as inputs, one locked output back to self.
    assert_eq!(stake_tx.prefix.inputs.len(), 2);
    assert_eq!(stake_tx.prefix.outputs.len(), 1);
    assert_eq!(stake_tx.prefix.outputs[0].amount, 5_000_000_000);
    assert_eq!(stake_tx.prefix.outputs[0].key, key.public().to_bytes());

    // The staking record's inner signature verifies over the fixed-width
    // message.
    let record = stake_tx.prefix.extra.staking().unwrap();
    assert_eq!(record.amount, 5_000_000_000);
    assert_eq!(record.lock_days, 30);
    assert_eq!(record.unlock_time, stake_tx.prefix.unlock_time);
    let mut message = Vec::new();
    message.extend_from_slice(&record.amount.to_le_bytes());
    message.extend_from_slice(&record.lock_days.to_le_bytes());
    message.extend_from_slice(&record.unlock_time.to_le_bytes());
    assert!(verify(
        &nct_crypto_keys::keccak256(&message),
        key.public(),
        &record.signature
    ));

    // Once confirmed, the staked output shows up as staking-locked.
    {
        node.push_info(132);
        node.push_sync(batch(vec![{
            let mut b = block_with_tx(131, 0x31, &stake_tx);
            b.staking_txs = std::mem::take(&mut b.transactions);
            b
        }]));
    }
    wallet.perform_sync().await.unwrap();
    assert_eq!(wallet.staking_locked_balance(), 5_000_000_000);
}

#[tokio::test]
async fn snapshot_restore_round_trips_through_serde() {
    let key = keypair(13);
    let node = MockNode::default();
    node.push_info(115);
    node.push_sync(batch(
        std::iter::once(coinbase_block(101, 1, &key, 123_456_789))
            .chain((102..=115).map(|h| empty_block(h, h as u8)))
            .collect(),
    ));

    let mut wallet = Wallet::new(vec![key.clone()], Box::new(node.clone()), fast_config(), 100);
    wallet.perform_sync().await.unwrap();

    let snapshot = wallet.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let reloaded = serde_json::from_str(&json).unwrap();

    let node = MockNode::default();
    let mut restored = Wallet::restore(vec![key], Box::new(node.clone()), fast_config(), reloaded);
    assert_eq!(restored.available_balance(), wallet.available_balance());
    assert_eq!(restored.transactions(10), wallet.transactions(10));
    assert_eq!(restored.snapshot(), snapshot);

    // Resuming sync from a snapshot keeps the contiguity check armed: a
    // batch that skips ahead of the restored height is an ordering
    // violation, not silently ingested.
    node.push_info(120);
    node.push_sync(batch(vec![empty_block(120, 0x78)]));
    restored.perform_sync().await.unwrap();

    let state = restored.sync_state();
    assert_eq!(state.ordering_violations, 1);
    assert_eq!(state.current_height, 115);

    // A contiguous continuation is still accepted.
    node.push_sync(batch((116..=120).map(|h| empty_block(h, h as u8)).collect()));
    restored.perform_sync().await.unwrap();
    assert_eq!(restored.sync_state().current_height, 120);
}
