//! The indexing pipeline: one block enqueuer feeding a pool of tx workers,
//! two event loops, and a single DB writer, all joined by bounded channels.
//!
//! Shutdown is cooperative: the enqueuer returning closes the heights
//! channel, the workers drain and drop their batch senders, and the writer
//! exits once every input stream has closed.

pub mod block_events;
pub mod db_writer;
pub mod enqueuer;
pub mod epoch_events;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::domain::errors::IndexerError;
use crate::domain::models::tx::{BlockEventBatch, EpochEventBatch, TxBatch};
use crate::domain::services::{EventRelevanceRegistry, MessageRegistry, TxParser};
use crate::infrastructure::persistence::Repositories;
use crate::infrastructure::rpc::NodeClient;
use crate::utils::logging;

use db_writer::DbWriter;
use enqueuer::BlockEnqueuer;

/// Heights queue capacity; bounds the backlog so the enqueuer blocks
/// instead of holding one entry per block of the whole chain
const HEIGHT_QUEUE_CAPACITY: usize = 10_000;

/// Block at startup until the node reports caught-up, polling every
/// `wait_for_chain_delay` seconds
pub async fn wait_for_chain_ready(
    client: &NodeClient,
    config: &AppConfig,
) -> Result<(), IndexerError> {
    if !config.indexing.wait_for_chain {
        return Ok(());
    }

    loop {
        match client.is_catching_up().await {
            Ok(false) => return Ok(()),
            Ok(true) => {
                logging::log_debug(
                    "Chain is still catching up, please wait or disable the check in config",
                );
                tokio::time::sleep(Duration::from_secs(config.indexing.wait_for_chain_delay)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// The assembled pipeline for one chain
pub struct Indexer {
    config: AppConfig,
    client: NodeClient,
    repositories: Repositories,
    registry: Arc<MessageRegistry>,
    event_registry: Arc<EventRelevanceRegistry>,
    chain_db_id: i32,
}

impl Indexer {
    pub fn new(
        config: AppConfig,
        client: NodeClient,
        repositories: Repositories,
        registry: Arc<MessageRegistry>,
        event_registry: Arc<EventRelevanceRegistry>,
        chain_db_id: i32,
    ) -> Self {
        Self {
            config,
            client,
            repositories,
            registry,
            event_registry,
            chain_db_id,
        }
    }

    /// Run the pipeline to completion. The denom scheduler handle, when
    /// present, is stopped once the enqueuer is done and before the
    /// pipeline is awaited.
    pub async fn run(&self, scheduler: Option<JoinHandle<()>>) -> Result<(), IndexerError> {
        let indexing = &self.config.indexing;
        let worker_count = self.config.rpc_worker_count();
        let batch_capacity = 4 * worker_count;

        let (height_tx, height_rx) = mpsc::channel::<i64>(HEIGHT_QUEUE_CAPACITY);
        let height_rx = Arc::new(Mutex::new(height_rx));
        let (batch_tx, batch_rx) = mpsc::channel::<TxBatch>(batch_capacity);
        let (block_event_tx, block_event_rx) = mpsc::channel::<BlockEventBatch>(batch_capacity);
        let (epoch_event_tx, epoch_event_rx) = mpsc::channel::<EpochEventBatch>(batch_capacity);

        // Tx workers. The batch channel closes on its own once the last
        // worker drops its sender clone.
        let mut worker_handles = Vec::new();
        if indexing.chain_indexing_enabled {
            let parser = Arc::new(TxParser::new(
                self.registry.clone(),
                &self.config.chain.account_prefix,
            ));
            for worker_id in 0..worker_count {
                worker_handles.push(tokio::spawn(worker::run_worker(
                    worker_id,
                    self.client.clone(),
                    parser.clone(),
                    self.repositories.clone(),
                    self.chain_db_id,
                    height_rx.clone(),
                    batch_tx.clone(),
                )));
            }
        }
        drop(batch_tx);

        // Event loops; a disabled loop closes its channel immediately
        let block_events_handle = if indexing.block_event_indexing_enabled {
            Some(tokio::spawn(block_events::run_block_event_loop(
                self.client.clone(),
                self.repositories.clone(),
                self.event_registry.clone(),
                indexing.clone(),
                self.chain_db_id,
                block_event_tx,
            )))
        } else {
            drop(block_event_tx);
            None
        };

        let epoch_events_handle = if indexing.epoch_event_indexing_enabled {
            Some(tokio::spawn(epoch_events::run_epoch_event_loop(
                self.client.clone(),
                self.repositories.clone(),
                self.event_registry.clone(),
                indexing.clone(),
                self.chain_db_id,
                epoch_event_tx,
            )))
        } else {
            drop(epoch_event_tx);
            None
        };

        // The sole database writer
        let writer_enabled = indexing.chain_indexing_enabled
            || indexing.block_event_indexing_enabled
            || indexing.epoch_event_indexing_enabled;
        let writer_handle = if writer_enabled {
            let writer = DbWriter::new(
                self.repositories.clone(),
                self.chain_db_id,
                indexing.dry_run,
                indexing.block_timer,
            );
            Some(tokio::spawn(async move {
                // A writer failure takes the whole process down; producers
                // must never outlive the writer
                if let Err(e) = writer
                    .run(Some(batch_rx), Some(block_event_rx), Some(epoch_event_rx))
                    .await
                {
                    logging::log_fatal(&format!("{}", e));
                }
            }))
        } else {
            None
        };

        // Feed the pipeline from this task; returning drops the height
        // sender and lets the workers drain
        if indexing.chain_indexing_enabled {
            let block_enqueuer = BlockEnqueuer::new(
                self.client.clone(),
                self.repositories.clone(),
                indexing.clone(),
                self.chain_db_id,
            );
            if indexing.reindex_message_type.is_empty() {
                block_enqueuer.enqueue_blocks(&height_tx).await?;
            } else {
                block_enqueuer
                    .enqueue_by_message_type(&height_tx, &indexing.reindex_message_type)
                    .await?;
            }
        }
        drop(height_tx);

        // The scheduler would otherwise keep the process alive while we
        // wait on the pipeline
        if let Some(scheduler) = scheduler {
            scheduler.abort();
        }

        for handle in worker_handles {
            let _ = handle.await;
        }
        if let Some(handle) = block_events_handle {
            let _ = handle.await;
        }
        if let Some(handle) = epoch_events_handle {
            let _ = handle.await;
        }
        if let Some(handle) = writer_handle {
            let _ = handle.await;
        }

        Ok(())
    }
}
