use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::infrastructure::rpc::error::RpcError;
use crate::infrastructure::rpc::types::{
    BlockResult, BlockResultsResponse, DecodeTxResponse, RpcEnvelope, StatusResult, Tx,
    TxsByHeightResponse,
};
use crate::utils::logging;

/// Connection settings for a Cosmos node. The keyring fields are recognized
/// for parity with chain tooling configs; only the addresses and the account
/// prefix feed the indexing pipeline.
#[derive(Debug, Clone)]
pub struct NodeClientConfig {
    pub chain_id: String,
    pub rpc_addr: String,
    pub api_addr: String,
    pub account_prefix: String,
    pub keyring_backend: String,
    pub home_path: String,
    pub key_name: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Delay before the single retry on a trailing-EOF status error
    pub eof_retry_delay: Duration,
}

/// Typed read-only access to a Cosmos node: the Tendermint RPC endpoints
/// plus the tx service API. Cloneable and safe for concurrent reads.
#[derive(Debug, Clone)]
pub struct NodeClient {
    http: Client,
    rpc_addr: String,
    api_addr: String,
    eof_retry_delay: Duration,
}

impl NodeClient {
    pub fn new(config: &NodeClientConfig) -> Result<Self, RpcError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(RpcError::from)?;

        Ok(NodeClient {
            http,
            rpc_addr: config.rpc_addr.trim_end_matches('/').to_string(),
            api_addr: config.api_addr.trim_end_matches('/').to_string(),
            eof_retry_delay: config.eof_retry_delay,
        })
    }

    /// Latest block height known to the node
    pub async fn latest_height(&self) -> Result<i64, RpcError> {
        let status: StatusResult = self.rpc_get("/status", &[]).await?;
        status
            .sync_info
            .latest_block_height
            .parse()
            .map_err(|_| RpcError::Malformed("latest_block_height is not a number".to_string()))
    }

    /// Whether the node is still syncing. A trailing-EOF failure is retried
    /// once after the configured delay before the error surfaces.
    pub async fn is_catching_up(&self) -> Result<bool, RpcError> {
        match self.catching_up_once().await {
            Ok(v) => Ok(v),
            Err(e) if e.to_string().ends_with("EOF") => {
                logging::log_debug("Status query hit EOF, retrying once");
                tokio::time::sleep(self.eof_retry_delay).await;
                self.catching_up_once().await
            }
            Err(e) => Err(e),
        }
    }

    async fn catching_up_once(&self) -> Result<bool, RpcError> {
        let status: StatusResult = self.rpc_get("/status", &[]).await?;
        Ok(status.sync_info.catching_up)
    }

    /// Block envelope (header time + raw txs) at a height
    pub async fn block(&self, height: i64) -> Result<BlockResult, RpcError> {
        self.rpc_get("/block", &[("height", height.to_string())])
            .await
    }

    /// ABCI results (per-tx results, begin/end block events) at a height
    pub async fn block_results(&self, height: i64) -> Result<BlockResultsResponse, RpcError> {
        self.rpc_get("/block_results", &[("height", height.to_string())])
            .await
    }

    /// `block_results` with exponential backoff: 1s, 2s, 4s, ... capped at
    /// `max_wait` seconds, up to `attempts` tries.
    pub async fn block_results_retrying(
        &self,
        height: i64,
        attempts: u64,
        max_wait: u64,
    ) -> Result<BlockResultsResponse, RpcError> {
        let tries = attempts.max(1);
        let mut last_err = None;

        for attempt in 0..tries {
            match self.block_results(height).await {
                Ok(results) => return Ok(results),
                Err(e) => {
                    if attempt + 1 < tries {
                        let delay = backoff_seconds(attempt, max_wait);
                        logging::log_warning(&format!(
                            "Block results query for height {} failed (attempt {}/{}): {}. Retrying in {}s",
                            height,
                            attempt + 1,
                            tries,
                            e,
                            delay
                        ));
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| RpcError::Malformed("no attempts made".to_string())))
    }

    /// Transactions at a height through the tx service API. A node that
    /// cannot marshal a message type returns the dedicated
    /// `TypeUrlUnresolvable` error.
    pub async fn txs_by_height(&self, height: i64) -> Result<TxsByHeightResponse, RpcError> {
        let url = format!("{}/cosmos/tx/v1beta1/txs", self.api_addr);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("events", format!("tx.height={}", height)),
                ("pagination.limit", "500".to_string()),
            ])
            .send()
            .await?;

        let code = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::classify(code, body));
        }

        response
            .json::<TxsByHeightResponse>()
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))
    }

    /// Decode raw tx bytes (base64) through the tx service decode endpoint.
    /// This is the typed decode API used on the fallback path.
    pub async fn decode_tx(&self, tx_bytes_b64: &str) -> Result<Tx, RpcError> {
        let url = format!("{}/cosmos/tx/v1beta1/decode", self.api_addr);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "tx_bytes": tx_bytes_b64 }))
            .send()
            .await?;

        let code = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::classify(code, body));
        }

        response
            .json::<DecodeTxResponse>()
            .await
            .map(|d| d.tx)
            .map_err(|e| RpcError::Malformed(e.to_string()))
    }

    /// Perform a Tendermint RPC GET and unwrap the JSON-RPC envelope
    async fn rpc_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RpcError> {
        let url = format!("{}{}", self.rpc_addr, path);
        let response = self.http.get(&url).query(query).send().await?;

        let code = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::classify(code, body));
        }

        let envelope = response
            .json::<RpcEnvelope<T>>()
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))?;

        if let Some(error) = envelope.error {
            return Err(RpcError::classify_envelope(error.combined()));
        }

        envelope
            .result
            .ok_or_else(|| RpcError::Malformed("envelope carried neither result nor error".to_string()))
    }
}

fn backoff_seconds(attempt: u64, max_wait: u64) -> u64 {
    let exp = 1u64 << attempt.min(16);
    exp.min(max_wait.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_seconds(0, 30), 1);
        assert_eq!(backoff_seconds(1, 30), 2);
        assert_eq!(backoff_seconds(4, 30), 16);
        assert_eq!(backoff_seconds(10, 30), 30);
    }
}
