//! Epoch event indexer: walks the unindexed epochs for the configured
//! identifier and emits the boundary events found at each epoch's start
//! height. The writer flips the epoch's `indexed` flag on persist.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use tokio::sync::mpsc;

use crate::config::IndexingConfig;
use crate::domain::models::tx::EpochEventBatch;
use crate::domain::services::{event_parser, EventRelevanceRegistry};
use crate::infrastructure::persistence::Repositories;
use crate::infrastructure::rpc::NodeClient;
use crate::utils::logging;

pub async fn run_epoch_event_loop(
    client: NodeClient,
    repositories: Repositories,
    registry: Arc<EventRelevanceRegistry>,
    config: IndexingConfig,
    chain_db_id: i32,
    sender: mpsc::Sender<EpochEventBatch>,
) {
    let start_epoch = config.epoch_events_start_epoch;
    let end_epoch = config.epoch_events_end_epoch;
    let identifier = config.epoch_indexing_identifier.clone();

    let epochs = match repositories
        .epoch
        .unindexed_epochs(chain_db_id, &identifier, start_epoch, end_epoch)
        .await
    {
        Ok(epochs) => epochs,
        Err(e) => logging::log_fatal(&format!(
            "Error getting epochs between {} and {} for identifier {}: {}",
            start_epoch, end_epoch, identifier, e
        )),
    };

    if epochs.is_empty() {
        logging::log_info(&format!(
            "No unindexed epochs found in database between start {} and end {} for epoch identifier {}",
            start_epoch, end_epoch, identifier
        ));
        return;
    }

    logging::log_info(&format!(
        "Indexing epoch events from epoch {} to {}",
        start_epoch, end_epoch
    ));

    for epoch in epochs {
        logging::log_info(&format!(
            "Indexing epoch events for epoch {} at height {}",
            epoch.epoch_number, epoch.start_height
        ));

        let block_results = match client
            .block_results_retrying(
                epoch.start_height,
                config.rpc_retry_attempts,
                config.rpc_retry_max_wait,
            )
            .await
        {
            Ok(results) => results,
            Err(e) => {
                logging::log_error(&format!(
                    "Error receiving block result for block {}: {}",
                    epoch.start_height, e
                ));
                record_failed_event_block(&repositories, epoch.start_height, chain_db_id).await;
                throttle(&config).await;
                continue;
            }
        };

        let relevant_events =
            event_parser::process_epoch_events(&block_results, &identifier, &registry);
        if relevant_events.is_empty() {
            logging::log_info(&format!(
                "Block {} has no relevant epoch events",
                block_results.height()
            ));
        }

        // The batch is emitted even with no events so the epoch still gets
        // marked indexed after the persist
        match client.block(epoch.start_height).await {
            Ok(block) => match DateTime::parse_from_rfc3339(&block.block.header.time) {
                Ok(block_time) => {
                    let batch = EpochEventBatch {
                        height: block_results.height(),
                        block_time,
                        events: relevant_events,
                        epoch_number: epoch.epoch_number,
                        epoch_identifier: identifier.clone(),
                    };
                    if sender.send(batch).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    logging::log_error(&format!(
                        "Malformed block time for block {}: {}",
                        epoch.start_height, e
                    ));
                    record_failed_event_block(&repositories, epoch.start_height, chain_db_id).await;
                }
            },
            Err(e) => {
                logging::log_error(&format!(
                    "Error getting block info for block {}: {}",
                    epoch.start_height, e
                ));
                record_failed_event_block(&repositories, epoch.start_height, chain_db_id).await;
            }
        }

        throttle(&config).await;
    }

    logging::log_info(&format!(
        "Finished gathering epoch events for epochs {} to {} in identifier {}",
        start_epoch, end_epoch, identifier
    ));
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
