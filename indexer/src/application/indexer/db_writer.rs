//! DB writer: the single consumer of all three batch streams and the only
//! task that writes pipeline data to the database.
//!
//! Each persist gets one reattempt; a second failure is fatal, as is a
//! reattempt ratio above 10%.

use std::time::Instant;

use tokio::sync::mpsc;

use crate::domain::errors::IndexerError;
use crate::domain::models::events::RelevantEvent;
use crate::domain::models::tx::{BlockEventBatch, EpochEventBatch, TxBatch};
use crate::infrastructure::persistence::Repositories;
use crate::utils::logging;

/// True when more than 10% of writes needed a reattempt
pub(crate) fn reattempt_ratio_exceeded(reattempts: u64, writes: u64) -> bool {
    writes > 0 && reattempts as f64 / writes as f64 > 0.1
}

/// Receive from an optional channel; a closed channel clears its slot so
/// the select loop can terminate once every stream has drained
async fn next_batch<T>(receiver: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match receiver {
        Some(rx) => match rx.recv().await {
            Some(batch) => Some(batch),
            None => {
                *receiver = None;
                None
            }
        },
        None => std::future::pending().await,
    }
}

pub struct DbWriter {
    repositories: Repositories,
    chain_db_id: i32,
    dry_run: bool,
    block_timer: u64,
}

impl DbWriter {
    pub fn new(repositories: Repositories, chain_db_id: i32, dry_run: bool, block_timer: u64) -> Self {
        Self {
            repositories,
            chain_db_id,
            dry_run,
            block_timer,
        }
    }

    /// Consume the three batch streams until all of them close. Any error
    /// returned here is fatal to the process.
    pub async fn run(
        &self,
        mut tx_rx: Option<mpsc::Receiver<TxBatch>>,
        mut block_event_rx: Option<mpsc::Receiver<BlockEventBatch>>,
        mut epoch_event_rx: Option<mpsc::Receiver<EpochEventBatch>>,
    ) -> Result<(), IndexerError> {
        let mut blocks_processed: u64 = 0;
        let mut db_writes: u64 = 0;
        let mut db_reattempts: u64 = 0;
        let mut timer_start = Instant::now();

        loop {
            if tx_rx.is_none() && block_event_rx.is_none() && epoch_event_rx.is_none() {
                logging::log_info("DB updates complete");
                return Ok(());
            }

            tokio::select! {
                batch = next_batch(&mut tx_rx) => {
                    let batch = match batch { Some(b) => b, None => continue };
                    db_writes += 1;
                    if !self.dry_run {
                        logging::log_info(&format!(
                            "Indexing {} TXs from block {}",
                            batch.txs.len(),
                            batch.height
                        ));
                        self.write_tx_batch(&batch, &mut db_reattempts).await?;
                    } else {
                        logging::log_info(&format!(
                            "Processing block {} (dry run, block data will not be stored in DB)",
                            batch.height
                        ));
                    }

                    // Throughput bookkeeping plus the corruption canary
                    if self.block_timer > 0 {
                        blocks_processed += 1;
                        if blocks_processed % self.block_timer == 0 {
                            logging::log_info(&format!(
                                "Processing {} blocks took {:.2} seconds. {} total blocks have been processed",
                                self.block_timer,
                                timer_start.elapsed().as_secs_f64(),
                                blocks_processed
                            ));
                            timer_start = Instant::now();
                        }
                        if reattempt_ratio_exceeded(db_reattempts, db_writes) {
                            return Err(IndexerError::WriteFailureRateExceeded {
                                reattempts: db_reattempts,
                                writes: db_writes,
                            });
                        }
                    }
                }
                batch = next_batch(&mut block_event_rx) => {
                    let batch = match batch { Some(b) => b, None => continue };
                    db_writes += 1;
                    logging::log_info(&format!(
                        "Indexing {} block events from block {}",
                        batch.events.len(),
                        batch.height
                    ));
                    self.write_block_events(
                        batch.height,
                        batch.block_time,
                        &batch.events,
                        &format!("block {}", batch.height),
                        &mut db_reattempts,
                    )
                    .await?;
                }
                batch = next_batch(&mut epoch_event_rx) => {
                    let batch = match batch { Some(b) => b, None => continue };
                    db_writes += 1;
                    let context = format!(
                        "epoch {} in epoch identifier {}",
                        batch.epoch_number, batch.epoch_identifier
                    );
                    logging::log_info(&format!(
                        "Indexing {} block events from block {} for {}",
                        batch.events.len(),
                        batch.height,
                        context
                    ));
                    self.write_block_events(
                        batch.height,
                        batch.block_time,
                        &batch.events,
                        &context,
                        &mut db_reattempts,
                    )
                    .await?;

                    if !self.dry_run {
                        self.repositories
                            .epoch
                            .mark_epoch_indexed(
                                self.chain_db_id,
                                &batch.epoch_identifier,
                                batch.epoch_number,
                            )
                            .await
                            .map_err(|e| {
                                IndexerError::WriteFailure(format!(
                                    "could not mark {} indexed: {}",
                                    context, e
                                ))
                            })?;
                    }
                }
            }
        }
    }

    /// Persist a tx batch with a single reattempt
    async fn write_tx_batch(
        &self,
        batch: &TxBatch,
        db_reattempts: &mut u64,
    ) -> Result<(), IndexerError> {
        let first = self
            .repositories
            .block
            .index_new_block(batch.height, batch.block_time, &batch.txs, self.chain_db_id)
            .await;

        if let Err(first_err) = first {
            *db_reattempts += 1;
            logging::log_warning(&format!(
                "Indexing block {} failed, reattempting: {}",
                batch.height, first_err
            ));
            self.repositories
                .block
                .index_new_block(batch.height, batch.block_time, &batch.txs, self.chain_db_id)
                .await
                .map_err(|e| {
                    IndexerError::WriteFailure(format!("error indexing block {}: {}", batch.height, e))
                })?;
        }
        Ok(())
    }

    /// Persist an event batch with a single reattempt. Dry-run consumes the
    /// batch without writing.
    async fn write_block_events(
        &self,
        height: i64,
        block_time: chrono::DateTime<chrono::FixedOffset>,
        events: &[RelevantEvent],
        context: &str,
        db_reattempts: &mut u64,
    ) -> Result<(), IndexerError> {
        if self.dry_run {
            return Ok(());
        }

        let first = self
            .repositories
            .block
            .index_block_events(height, block_time, events, self.chain_db_id)
            .await;

        if let Err(first_err) = first {
            *db_reattempts += 1;
            logging::log_warning(&format!(
                "Indexing block events for {} failed, reattempting: {}",
                context, first_err
            ));
            self.repositories
                .block
                .index_block_events(height, block_time, events, self.chain_db_id)
                .await
                .map_err(|e| {
                    IndexerError::WriteFailure(format!(
                        "error indexing block events for {}: {}",
                        context, e
                    ))
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_guard_trips_past_ten_percent() {
        assert!(!reattempt_ratio_exceeded(0, 100));
        assert!(!reattempt_ratio_exceeded(10, 100));
        assert!(reattempt_ratio_exceeded(11, 100));
        // No writes yet means nothing to judge
        assert!(!reattempt_ratio_exceeded(0, 0));
    }

    #[tokio::test]
    async fn next_batch_clears_closed_channels() {
        let (tx, rx) = mpsc::channel::<u32>(4);
        let mut slot = Some(rx);

        tx.send(7).await.unwrap();
        drop(tx);

        assert_eq!(next_batch(&mut slot).await, Some(7));
        assert_eq!(next_batch(&mut slot).await, None);
        assert!(slot.is_none());
    }
}
