//! Node RPC transport.
//!
//! A narrow façade over the three daemon endpoints the wallet consumes:
//! `/info`, `/getwalletsyncdata` and `/sendrawtransaction`. Field names are
//! fixed by wire compatibility; several have historical aliases which are
//! accepted on input. The node is untrusted; everything it returns is
//! re-validated before touching wallet state.

use std::time::Duration;

use async_trait::async_trait;
use nct_transaction_core::{CodecError, Hash};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{Result, WalletError},
    types::{BlockData, InputData, OutputData, TxData},
};

/// Default per-request timeout.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Response of `GET /info`.
///
/// Servers report the NEXT expected height, so the current top block is one
/// below the reported value.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InfoResponse {
    /// The node's own chain height.
    pub height: u64,
    /// The network height, when the node knows it.
    #[serde(default)]
    pub network_height: Option<u64>,
    /// Whether the node believes itself synced.
    #[serde(default)]
    pub synced: Option<bool>,
}

impl InfoResponse {
    /// Height of the network's current top block.
    pub fn top_block_height(&self) -> u64 {
        self.network_height.unwrap_or(self.height).saturating_sub(1)
    }
}

/// Request body of `POST /getwalletsyncdata`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDataRequest {
    /// Most recent checkpoints, height-descending, hex encoded.
    pub block_hash_checkpoints: Vec<String>,
    /// Height to start from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_height: Option<u64>,
    /// Timestamp hint matching `start_height`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<u64>,
    /// Maximum number of blocks to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_count: Option<u64>,
}

/// Response body of `POST /getwalletsyncdata`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SyncDataResponse {
    /// Server status string.
    #[serde(default)]
    pub status: Option<String>,
    /// Returned blocks. `newBlocks` is a historical alias for `items`.
    #[serde(default, alias = "newBlocks")]
    pub items: Option<Vec<WireBlock>>,
    /// Set when the wallet is already at the network tip.
    #[serde(default)]
    pub synced: Option<bool>,
    /// The network's top block, present alongside `synced`.
    #[serde(default, rename = "topBlock")]
    pub top_block: Option<WireTopBlock>,
}

/// The network's top block as reported by the server.
#[derive(Clone, Debug, Deserialize)]
pub struct WireTopBlock {
    /// Hex block hash.
    pub hash: String,
    /// Block height.
    pub height: u64,
}

/// One block inside a sync-data response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WireBlock {
    /// Block height.
    #[serde(rename = "blockHeight")]
    pub height: u64,
    /// Hex block hash.
    #[serde(rename = "blockHash")]
    pub hash: String,
    /// Block timestamp.
    #[serde(rename = "blockTimestamp")]
    pub timestamp: u64,
    /// The coinbase transaction.
    #[serde(default, rename = "coinbaseTX", alias = "coinbaseTransaction")]
    pub coinbase_tx: Option<WireTransaction>,
    /// Regular transactions.
    #[serde(default)]
    pub transactions: Vec<WireTransaction>,
    /// Staking-class transactions.
    #[serde(default, rename = "stakingTX")]
    pub staking_txs: Vec<WireTransaction>,
}

/// One transaction inside a wire block.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WireTransaction {
    /// Hex transaction hash.
    pub hash: String,
    /// Outputs; `keyOutputs` is a historical alias.
    #[serde(default, alias = "keyOutputs")]
    pub outputs: Vec<WireOutput>,
    /// Key inputs; `keyInputs` is a historical alias.
    #[serde(default, alias = "keyInputs")]
    pub inputs: Vec<WireInput>,
    /// Hex transaction public key.
    #[serde(default, rename = "txPublicKey", alias = "transactionPublicKey")]
    pub tx_public_key: Option<String>,
    /// Unlock time from the prefix.
    #[serde(default, rename = "unlockTime")]
    pub unlock_time: u64,
}

/// One output inside a wire transaction.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WireOutput {
    /// Hex spend public key.
    pub key: String,
    /// Value in atomic units.
    pub amount: u64,
    /// Chain-global output index, when the server tracks one.
    #[serde(default, rename = "globalOutputIndex")]
    pub global_output_index: Option<u64>,
}

/// One key input inside a wire transaction.
///
/// Some servers nest `keyOffsets` inside a `value` object; both layouts are
/// accepted.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WireInput {
    /// Value of the referenced output.
    #[serde(default)]
    pub amount: u64,
    /// Historical index list (flat layout).
    #[serde(default, rename = "keyOffsets")]
    pub key_offsets: Option<Vec<u64>>,
    /// Historical index list (nested layout).
    #[serde(default)]
    pub value: Option<WireInputValue>,
    /// Hex hash of the producing transaction.
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
    /// Output index within the producing transaction.
    #[serde(rename = "outputIndex")]
    pub output_index: u32,
    /// Hex key image, when present.
    #[serde(default, rename = "keyImage")]
    pub key_image: Option<String>,
}

/// Nested container some servers wrap `keyOffsets` in.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WireInputValue {
    /// Historical index list.
    #[serde(default, rename = "keyOffsets")]
    pub key_offsets: Vec<u64>,
}

impl WireInput {
    /// The index list, whichever layout carried it.
    pub fn offsets(&self) -> &[u64] {
        if let Some(flat) = &self.key_offsets {
            flat
        } else if let Some(nested) = &self.value {
            &nested.key_offsets
        } else {
            &[]
        }
    }
}

/// Request body of `POST /sendrawtransaction`.
#[derive(Clone, Debug, Serialize)]
pub struct SendRawRequest {
    /// Hex of the full serialized transaction.
    pub tx_as_hex: String,
}

/// Response body of `POST /sendrawtransaction`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SendRawResponse {
    /// Server status string.
    #[serde(default)]
    pub status: Option<String>,
    /// Hash assigned by the node.
    #[serde(default, rename = "transactionHash")]
    pub transaction_hash: Option<String>,
    /// Rejection reason.
    #[serde(default)]
    pub error: Option<String>,
}

fn parse_hash(hex_str: &str, what: &'static str) -> Result<Hash> {
    let bytes = hex::decode(hex_str).map_err(|_| CodecError::InvalidHex(what))?;
    bytes
        .try_into()
        .map_err(|_| WalletError::CodecInvalid(CodecError::InvalidHex(what)))
}

fn parse_transaction(wire: &WireTransaction) -> Result<TxData> {
    let tx_pubkey = match &wire.tx_public_key {
        Some(hex_str) => parse_hash(hex_str, "transaction public key")?,
        None => [0u8; 32],
    };

    let outputs = wire
        .outputs
        .iter()
        .map(|output| {
            Ok(OutputData {
                key: parse_hash(&output.key, "output key")?,
                amount: output.amount,
                global_output_index: output.global_output_index,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let inputs = wire
        .inputs
        .iter()
        .map(|input| {
            Ok(InputData {
                amount: input.amount,
                key_offsets: input.offsets().to_vec(),
                tx_hash: parse_hash(&input.transaction_hash, "input transaction hash")?,
                out_index: input.output_index,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TxData {
        hash: parse_hash(&wire.hash, "transaction hash")?,
        tx_pubkey,
        unlock_time: wire.unlock_time,
        outputs,
        inputs,
    })
}

impl TryFrom<&WireBlock> for BlockData {
    type Error = WalletError;

    fn try_from(wire: &WireBlock) -> Result<Self> {
        Ok(Self {
            height: wire.height,
            hash: parse_hash(&wire.hash, "block hash")?,
            timestamp: wire.timestamp,
            coinbase: wire
                .coinbase_tx
                .as_ref()
                .map(parse_transaction)
                .transpose()?,
            transactions: wire
                .transactions
                .iter()
                .map(parse_transaction)
                .collect::<Result<Vec<_>>>()?,
            staking_transactions: wire
                .staking_txs
                .iter()
                .map(parse_transaction)
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

/// The transport the sync driver and the wallet façade speak through.
///
/// Implementations must translate every HTTP-level failure into
/// [`WalletError::Transport`]; only a node's explicit refusal of a submitted
/// transaction becomes [`WalletError::Rejected`].
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Fetch `/info`.
    async fn get_info(&self, timeout: Duration) -> Result<InfoResponse>;

    /// Fetch a batch of blocks via `/getwalletsyncdata`.
    async fn get_wallet_sync_data(
        &self,
        request: SyncDataRequest,
        timeout: Duration,
    ) -> Result<SyncDataResponse>;

    /// Submit a serialized transaction via `/sendrawtransaction`.
    ///
    /// Returns the node-reported transaction hash.
    async fn send_raw_transaction(&self, tx_as_hex: &str, timeout: Duration) -> Result<String>;
}

/// HTTP implementation of [`NodeTransport`].
pub struct HttpNodeClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpNodeClient {
    /// Connect to the daemon at `base_url` (e.g. `http://127.0.0.1:11898`).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| WalletError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl NodeTransport for HttpNodeClient {
    async fn get_info(&self, timeout: Duration) -> Result<InfoResponse> {
        let response = self
            .client
            .get(self.url("info"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| WalletError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WalletError::Transport(format!(
                "HTTP {} from /info",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| WalletError::Transport(e.to_string()))
    }

    async fn get_wallet_sync_data(
        &self,
        request: SyncDataRequest,
        timeout: Duration,
    ) -> Result<SyncDataResponse> {
        debug!(
            start_height = ?request.start_height,
            checkpoints = request.block_hash_checkpoints.len(),
            "requesting wallet sync data"
        );

        let response = self
            .client
            .post(self.url("getwalletsyncdata"))
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WalletError::Transport(format!(
                "HTTP {} from /getwalletsyncdata",
                response.status()
            )));
        }

        let body: SyncDataResponse = response
            .json()
            .await
            .map_err(|e| WalletError::Transport(e.to_string()))?;

        if let Some(status) = &body.status {
            if status != "OK" {
                return Err(WalletError::Transport(format!(
                    "sync data status: {status}"
                )));
            }
        }

        Ok(body)
    }

    async fn send_raw_transaction(&self, tx_as_hex: &str, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .post(self.url("sendrawtransaction"))
            .timeout(timeout)
            .json(&SendRawRequest {
                tx_as_hex: tx_as_hex.to_string(),
            })
            .send()
            .await
            .map_err(|e| WalletError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WalletError::Transport(format!(
                "HTTP {} from /sendrawtransaction",
                response.status()
            )));
        }

        let body: SendRawResponse = response
            .json()
            .await
            .map_err(|e| WalletError::Transport(e.to_string()))?;

        match body.status.as_deref() {
            Some("OK") => Ok(body.transaction_hash.unwrap_or_default()),
            other => Err(WalletError::Rejected(
                body.error
                    .or_else(|| other.map(String::from))
                    .unwrap_or_else(|| "unknown rejection".to_string()),
            )),
        }
    }
}
