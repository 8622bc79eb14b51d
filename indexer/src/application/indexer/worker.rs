//! Tx worker pool: each worker pops heights, drives the RPC queries and
//! the tx parser, and emits one `TxBatch` per height. Terminal failures
//! become failure-ledger rows; the pool never stops for a bad height.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, FixedOffset};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, Mutex};

use crate::domain::errors::{BlockProcessingFailure, ParseError};
use crate::domain::models::tx::{TxBatch, TxWrapper};
use crate::domain::services::TxParser;
use crate::infrastructure::persistence::Repositories;
use crate::infrastructure::rpc::types::Tx;
use crate::infrastructure::rpc::{NodeClient, RpcError};
use crate::utils::logging;

/// Shared height receiver; workers take turns popping from it
pub type HeightReceiver = Arc<Mutex<mpsc::Receiver<i64>>>;

/// One worker: consume heights until the channel closes
pub async fn run_worker(
    worker_id: usize,
    client: NodeClient,
    parser: Arc<TxParser>,
    repositories: Repositories,
    chain_db_id: i32,
    heights: HeightReceiver,
    batches: mpsc::Sender<TxBatch>,
) {
    loop {
        let height = { heights.lock().await.recv().await };
        let height = match height {
            Some(height) => height,
            None => break,
        };

        match process_height(&client, &parser, height).await {
            Ok(batch) => {
                if batches.send(batch).await.is_err() {
                    // Writer is gone; the pipeline is shutting down
                    return;
                }
            }
            Err(failure) => {
                logging::log_error(&format!(
                    "Failed to process block {} ({}). Will add to failed blocks table",
                    height, failure
                ));
                if let Err(e) = repositories
                    .failed_block
                    .upsert_failed_block(height, chain_db_id)
                    .await
                {
                    logging::log_fatal(&format!(
                        "Failed to store that block {} failed: {}. Not safe to continue.",
                        height, e
                    ));
                }
            }
        }
    }

    logging::log_debug(&format!("Worker {} finished", worker_id));
}

/// Fetch and parse one height, preferring the tx service query and falling
/// back to raw block decoding when the node cannot marshal the txs (or
/// claims there are none).
async fn process_height(
    client: &NodeClient,
    parser: &TxParser,
    height: i64,
) -> Result<TxBatch, BlockProcessingFailure> {
    let mut type_url_unresolvable = false;

    let preferred = match client.txs_by_height(height).await {
        Ok(response) => Some(response),
        Err(RpcError::TypeUrlUnresolvable(_)) => {
            type_url_unresolvable = true;
            None
        }
        Err(e) => {
            logging::log_error(&format!(
                "Error getting transactions by block height ({}): {}. Will reattempt",
                height, e
            ));
            return Err(BlockProcessingFailure::BlockQueryError);
        }
    };

    // Two reasons to fall back: the node cannot resolve a type URL, or the
    // tx query reported zero txs (which GetBlockResults may contradict)
    if type_url_unresolvable || preferred.as_ref().map(|r| r.txs.is_empty()).unwrap_or(true) {
        return process_height_fallback(client, parser, height).await;
    }

    let response = preferred.unwrap_or_default();
    let (txs, block_time) = parser.process_txs_response(&response).map_err(|e| {
        fail_on_fatal_parse(&e, height);
        logging::log_error(&format!("ProcessTxs unhandled error at {}: {}", height, e));
        BlockProcessingFailure::UnprocessableTxError
    })?;

    let block_time = match block_time {
        Some(time) => time,
        None => fetch_block_time(client, height).await?,
    };

    Ok(TxBatch {
        height,
        block_time,
        txs,
    })
}

/// Fallback path: `block_results` decides whether the block truly has txs;
/// if so the raw block is decoded tx by tx through the codec endpoint.
async fn process_height_fallback(
    client: &NodeClient,
    parser: &TxParser,
    height: i64,
) -> Result<TxBatch, BlockProcessingFailure> {
    let block_results = match client.block_results(height).await {
        Ok(results) => results,
        Err(e) if e.is_pruned_height() => {
            logging::log_error(&format!(
                "Node is missing history for block {}: {}",
                height, e
            ));
            return Err(BlockProcessingFailure::NodeMissingHistoryForBlock);
        }
        Err(e) => {
            logging::log_error(&format!(
                "Error receiving block results for block {}: {}",
                height, e
            ));
            return Err(BlockProcessingFailure::BlockQueryError);
        }
    };

    // No tx results: the block is genuinely empty. Emit an empty wrapper
    // but still record the real block time.
    if block_results.tx_results().is_empty() {
        let block_time = fetch_block_time(client, height).await?;
        return Ok(TxBatch {
            height,
            block_time,
            txs: Vec::new(),
        });
    }

    logging::log_debug(&format!(
        "Falling back to secondary queries for block height {}",
        height
    ));

    let block = match client.block(height).await {
        Ok(block) => block,
        Err(e) => {
            logging::log_error(&format!("Secondary RPC query failed, {}: {}", height, e));
            return Err(BlockProcessingFailure::BlockQueryError);
        }
    };

    if block.block.data.txs.len() != block_results.tx_results().len() {
        logging::log_fatal(&format!(
            "Block {} carries {} txs but block results carry {}",
            height,
            block.block.data.txs.len(),
            block_results.tx_results().len()
        ));
    }

    let block_time = parse_block_time(&block.block.header.time, height)?;

    let mut decoded: Vec<(String, Tx)> = Vec::with_capacity(block.block.data.txs.len());
    for tx_b64 in &block.block.data.txs {
        let raw = match BASE64.decode(tx_b64) {
            Ok(raw) => raw,
            Err(e) => logging::log_fatal(&format!(
                "TX cannot be parsed from block {}: invalid base64: {}",
                height, e
            )),
        };
        let tx = match client.decode_tx(tx_b64).await {
            Ok(tx) => tx,
            Err(e) => {
                logging::log_error(&format!(
                    "Tx decode failed for block {}: {}. Will reattempt",
                    height, e
                ));
                return Err(BlockProcessingFailure::BlockQueryError);
            }
        };
        decoded.push((tx_hash_from_bytes(&raw), tx));
    }

    let txs: Vec<TxWrapper> = parser.process_block_txs(&decoded, &block_results).map_err(|e| {
        fail_on_fatal_parse(&e, height);
        logging::log_error(&format!(
            "Second query parser failed for block {}: {}",
            height, e
        ));
        BlockProcessingFailure::UnprocessableTxError
    })?;

    Ok(TxBatch {
        height,
        block_time,
        txs,
    })
}

/// A decoder failure for a supported type or a structural inconsistency
/// means we would silently index bad data; stop the process instead
fn fail_on_fatal_parse(error: &ParseError, height: i64) {
    match error {
        ParseError::DecoderFailed { type_url, .. } => logging::log_fatal(&format!(
            "Issue parsing a message of type '{}' at block {} that we DO have a parser for. \
             PLEASE INVESTIGATE",
            type_url, height
        )),
        ParseError::Inconsistency(msg) => {
            logging::log_fatal(&format!("Parser inconsistency at block {}: {}", height, msg))
        }
        _ => {}
    }
}

async fn fetch_block_time(
    client: &NodeClient,
    height: i64,
) -> Result<DateTime<FixedOffset>, BlockProcessingFailure> {
    let block = client.block(height).await.map_err(|e| {
        logging::log_error(&format!(
            "Error getting block info for block {}: {}",
            height, e
        ));
        BlockProcessingFailure::BlockQueryError
    })?;
    parse_block_time(&block.block.header.time, height)
}

fn parse_block_time(
    value: &str,
    height: i64,
) -> Result<DateTime<FixedOffset>, BlockProcessingFailure> {
    DateTime::parse_from_rfc3339(value).map_err(|e| {
        logging::log_error(&format!(
            "Malformed block time '{}' for block {}: {}",
            value, height, e
        ));
        BlockProcessingFailure::BlockQueryError
    })
}

/// Uppercase hex SHA-256 of the raw tx bytes, the same hash the tx service
/// reports for the tx
fn tx_hash_from_bytes(raw: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_hash_matches_the_tx_service_format() {
        // sha256("") is a well-known vector
        assert_eq!(
            tx_hash_from_bytes(b""),
            "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855"
        );
    }
}
