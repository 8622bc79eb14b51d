//! Wire shapes for the Tendermint RPC and the Cosmos tx service API.
//!
//! Heights travel as decimal strings on the wire; callers use the typed
//! accessors instead of parsing by hand.

use serde::Deserialize;
use serde_json::Value;

/// Envelope of a Tendermint JSON-RPC response
#[derive(Debug, Deserialize)]
pub struct RpcEnvelope<T> {
    pub result: Option<T>,
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: String,
}

impl RpcErrorBody {
    pub fn combined(&self) -> String {
        format!("{} {}", self.message, self.data).trim().to_string()
    }
}

// ---------------------------------------------------------------------------
// /status

#[derive(Debug, Deserialize)]
pub struct StatusResult {
    pub sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
pub struct SyncInfo {
    pub latest_block_height: String,
    pub catching_up: bool,
}

// ---------------------------------------------------------------------------
// /block

#[derive(Debug, Deserialize)]
pub struct BlockResult {
    pub block: Block,
}

#[derive(Debug, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub data: BlockData,
}

#[derive(Debug, Deserialize)]
pub struct BlockHeader {
    pub chain_id: String,
    pub height: String,
    /// RFC3339 timestamp
    pub time: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlockData {
    /// Raw transactions, base64 encoded
    #[serde(default)]
    pub txs: Vec<String>,
}

impl BlockResult {
    pub fn height(&self) -> i64 {
        self.block.header.height.parse().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// /block_results

#[derive(Debug, Deserialize)]
pub struct BlockResultsResponse {
    pub height: String,
    #[serde(default)]
    pub txs_results: Option<Vec<TxResult>>,
    #[serde(default)]
    pub begin_block_events: Option<Vec<AbciEvent>>,
    #[serde(default)]
    pub end_block_events: Option<Vec<AbciEvent>>,
}

impl BlockResultsResponse {
    pub fn height(&self) -> i64 {
        self.height.parse().unwrap_or_default()
    }

    pub fn tx_results(&self) -> &[TxResult] {
        self.txs_results.as_deref().unwrap_or(&[])
    }

    pub fn begin_events(&self) -> &[AbciEvent] {
        self.begin_block_events.as_deref().unwrap_or(&[])
    }

    pub fn end_events(&self) -> &[AbciEvent] {
        self.end_block_events.as_deref().unwrap_or(&[])
    }
}

/// Per-transaction ABCI result within a block
#[derive(Debug, Default, Deserialize)]
pub struct TxResult {
    #[serde(default)]
    pub code: u32,
    /// JSON array of per-message logs for successful txs; free text otherwise
    #[serde(default)]
    pub log: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AbciEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub attributes: Vec<AbciAttribute>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AbciAttribute {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

// ---------------------------------------------------------------------------
// Tx service API (gRPC gateway)

/// Response of `/cosmos/tx/v1beta1/txs?events=tx.height=H`
#[derive(Debug, Default, Deserialize)]
pub struct TxsByHeightResponse {
    #[serde(default)]
    pub txs: Vec<Tx>,
    #[serde(default)]
    pub tx_responses: Vec<TxResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tx {
    pub body: TxBody,
    pub auth_info: AuthInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxBody {
    /// Messages as JSON objects carrying an `@type` discriminator
    #[serde(default)]
    pub messages: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthInfo {
    #[serde(default)]
    pub signer_infos: Vec<SignerInfo>,
    #[serde(default)]
    pub fee: Option<TxFee>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignerInfo {
    #[serde(default)]
    pub public_key: Option<Value>,
    #[serde(default)]
    pub mode_info: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxFee {
    #[serde(default)]
    pub amount: Vec<Coin>,
    #[serde(default)]
    pub payer: String,
    #[serde(default)]
    pub granter: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxResponse {
    #[serde(default)]
    pub height: String,
    #[serde(default)]
    pub txhash: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub raw_log: String,
    #[serde(default)]
    pub logs: Vec<TxLog>,
    /// RFC3339 timestamp
    #[serde(default)]
    pub timestamp: String,
}

/// Per-message event log as returned by the tx service and as embedded in
/// `TxResult::log` for successful txs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxLog {
    #[serde(default)]
    pub msg_index: u32,
    #[serde(default)]
    pub events: Vec<AbciEvent>,
}

/// Response of `/cosmos/tx/v1beta1/decode`
#[derive(Debug, Deserialize)]
pub struct DecodeTxResponse {
    pub tx: Tx,
}
