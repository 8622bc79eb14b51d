//! Block event indexer: a single loop walking heights monotonically and
//! emitting the relevant begin/end-block events per height. Errors become
//! failed-event-block rows and the loop advances.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use tokio::sync::mpsc;

use crate::config::IndexingConfig;
use crate::domain::models::tx::BlockEventBatch;
use crate::domain::services::{event_parser, EventRelevanceRegistry};
use crate::infrastructure::persistence::Repositories;
use crate::infrastructure::rpc::NodeClient;
use crate::utils::logging;

pub async fn run_block_event_loop(
    client: NodeClient,
    repositories: Repositories,
    registry: Arc<EventRelevanceRegistry>,
    config: IndexingConfig,
    chain_db_id: i32,
    sender: mpsc::Sender<BlockEventBatch>,
) {
    let mut start_height = config.block_events_start_block;
    if start_height <= 0 {
        match repositories
            .block
            .highest_event_block_height(chain_db_id)
            .await
        {
            Ok(last_indexed) if last_indexed > 0 => start_height = last_indexed + 1,
            Ok(_) => {}
            Err(e) => logging::log_fatal(&format!(
                "Cannot retrieve highest indexed block event: {}",
                e
            )),
        }
    }
    // 0 isn't a valid starting block
    if start_height <= 0 {
        start_height = 1;
    }

    let end_height = config.block_events_end_block;
    let mut last_known_height = match client.latest_height().await {
        Ok(height) => height,
        Err(e) => logging::log_fatal(&format!(
            "Error getting blockchain latest height in block event indexer: {}",
            e
        )),
    };

    logging::log_info(&format!(
        "Indexing block events from block {} to {}",
        start_height, end_height
    ));

    let mut current_height = start_height;

    while end_height == -1 || current_height <= end_height {
        let block_results = match client
            .block_results_retrying(
                current_height,
                config.rpc_retry_attempts,
                config.rpc_retry_max_wait,
            )
            .await
        {
            Ok(results) => results,
            Err(e) => {
                logging::log_error(&format!(
                    "Error receiving block result for block {}: {}",
                    current_height, e
                ));
                record_failed_event_block(&repositories, current_height, chain_db_id).await;
                current_height += 1;
                throttle(&config).await;
                continue;
            }
        };

        let relevant_events = event_parser::process_block_events(&block_results, &registry);

        if relevant_events.is_empty() {
            logging::log_info(&format!(
                "Block {} has no relevant block events",
                current_height
            ));
        } else {
            match client.block(current_height).await {
                Ok(block) => match DateTime::parse_from_rfc3339(&block.block.header.time) {
                    Ok(block_time) => {
                        let batch = BlockEventBatch {
                            height: block_results.height(),
                            block_time,
                            events: relevant_events,
                        };
                        if sender.send(batch).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        logging::log_error(&format!(
                            "Malformed block time for block {}: {}",
                            current_height, e
                        ));
                        record_failed_event_block(&repositories, current_height, chain_db_id).await;
                    }
                },
                Err(e) => {
                    logging::log_error(&format!(
                        "Error getting block info for block {}: {}",
                        current_height, e
                    ));
                    record_failed_event_block(&repositories, current_height, chain_db_id).await;
                }
            }
        }

        current_height += 1;

        // Past the known tip: wait for the chain to produce new blocks so
        // the loop can run indefinitely
        if current_height > last_known_height {
            logging::log_info(&format!(
                "Block {} has passed the last known height, checking again",
                current_height
            ));
            loop {
                last_known_height = match client.latest_height().await {
                    Ok(height) => height,
                    Err(e) => logging::log_fatal(&format!(
                        "Error getting blockchain latest height in block event indexer: {}",
                        e
                    )),
                };

                if current_height > last_known_height {
                    logging::log_info("Sleeping...");
                    tokio::time::sleep(Duration::from_secs(20)).await;
                } else {
                    logging::log_info(&format!("Continuing until block {}", last_known_height));
                    throttle(&config).await;
                    break;
                }
            }
        } else {
            throttle(&config).await;
        }
    }
}

async fn record_failed_event_block(repositories: &Repositories, height: i64, chain_db_id: i32) {
    if let Err(e) = repositories
        .failed_block
        .upsert_failed_event_block(height, chain_db_id)
        .await
    {
        logging::log_fatal(&format!("Failed to insert failed block event: {}", e));
    }
}

async fn throttle(config: &IndexingConfig) {
    if config.throttling != 0 {
        tokio::time::sleep(Duration::from_secs(config.throttling)).await;
    }
}
