//! Block enqueuer: the single producer deciding which heights enter the
//! pipeline. Resume point, failed-block drain, live tail chasing and the
//! selective message-type reindex all live here.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::IndexingConfig;
use crate::domain::errors::IndexerError;
use crate::infrastructure::persistence::Repositories;
use crate::infrastructure::rpc::NodeClient;
use crate::utils::logging;

/// How the starting height gets determined for a run
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StartPolicy {
    /// Begin at this height directly
    Height(i64),
    /// Probe the database for the first missing height in the range
    FirstMissing { start: i64, end: i64 },
}

/// Pure resolution of the starting-height policy.
///
/// `start_block == -1` resumes past the highest indexed block (the live
/// loop keeps us from outrunning a node that is behind our index). In
/// reindex mode the configured start is taken as-is. Otherwise the run
/// fills the first gap in `[start_block, end]`.
pub(crate) fn start_policy(
    start_block: i64,
    end_block: i64,
    reindex: bool,
    highest_indexed: i64,
) -> StartPolicy {
    if start_block == -1 {
        return StartPolicy::Height(highest_indexed + 1);
    }
    if reindex {
        return StartPolicy::Height(start_block);
    }
    let end = if end_block == -1 {
        highest_indexed
    } else {
        end_block
    };
    StartPolicy::FirstMissing {
        start: start_block,
        end,
    }
}

pub struct BlockEnqueuer {
    client: NodeClient,
    repositories: Repositories,
    config: IndexingConfig,
    chain_db_id: i32,
}

impl BlockEnqueuer {
    pub fn new(
        client: NodeClient,
        repositories: Repositories,
        config: IndexingConfig,
        chain_db_id: i32,
    ) -> Self {
        Self {
            client,
            repositories,
            config,
            chain_db_id,
        }
    }

    /// Main enqueue loop: drain the failure ledger, then feed heights up to
    /// the node tip (or the configured end block), blocking on the channel
    /// when the worker pool is saturated.
    pub async fn enqueue_blocks(&self, sender: &mpsc::Sender<i64>) -> Result<(), IndexerError> {
        if !self.config.prevent_reattempts {
            self.enqueue_failed_blocks(sender).await?;
        }

        let mut current = self.starting_height().await?;
        let last_block = self.config.end_block;
        let mut latest_block = i64::MAX;

        loop {
            if last_block != -1 && current > last_block {
                logging::log_info("Hit the last block we're allowed to index, exiting enqueue");
                return Ok(());
            }
            if self.config.exit_when_caught_up && current > latest_block {
                logging::log_info("Caught up to the node tip, exiting enqueue");
                return Ok(());
            }

            // Only bother the node for a new tip once the queue has mostly
            // drained
            if sender.capacity() >= 3 * sender.max_capacity() / 4 {
                latest_block = self.client.latest_height().await?;
                self.throttle().await;

                while current <= latest_block
                    && (last_block == -1 || current <= last_block)
                    && sender.capacity() > 0
                {
                    if !self.config.reindex
                        && self
                            .repositories
                            .block
                            .block_already_indexed(current, self.chain_db_id)
                            .await?
                    {
                        current += 1;
                        continue;
                    }

                    self.throttle().await;

                    if sender.send(current).await.is_err() {
                        // Consumers are gone; nothing left to feed
                        return Ok(());
                    }
                    current += 1;
                }
            }

            // Either the queue is still busy or we are waiting on new blocks
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Drain the failure ledger: each failed height is emitted once and its
    /// row removed; a height that fails again gets re-recorded by a worker.
    async fn enqueue_failed_blocks(&self, sender: &mpsc::Sender<i64>) -> Result<(), IndexerError> {
        let failed_blocks = self
            .repositories
            .failed_block
            .get_failed_blocks(self.chain_db_id)
            .await?;
        if failed_blocks.is_empty() {
            return Ok(());
        }

        for height in failed_blocks {
            self.throttle().await;
            logging::log_info(&format!("Will re-attempt failed block: {}", height));
            if sender.send(height).await.is_err() {
                return Ok(());
            }
            self.repositories
                .failed_block
                .delete_failed_block(height, self.chain_db_id)
                .await?;
        }
        logging::log_info("All failed blocks have been re-enqueued for processing");
        Ok(())
    }

    /// Resolve where this run begins
    async fn starting_height(&self) -> Result<i64, IndexerError> {
        let highest = self
            .repositories
            .block
            .highest_indexed_height(self.chain_db_id)
            .await?;

        match start_policy(
            self.config.start_block,
            self.config.end_block,
            self.config.reindex,
            highest,
        ) {
            StartPolicy::Height(height) => {
                if self.config.start_block == -1 {
                    let latest = self.client.latest_height().await?;
                    logging::log_info(&format!("Found latest block {}", latest));
                }
                Ok(height)
            }
            StartPolicy::FirstMissing { start, end } => Ok(self
                .repositories
                .block
                .first_missing_height(start, end, self.chain_db_id)
                .await?),
        }
    }

    /// Selective reindex: emit exactly the heights whose stored messages
    /// include the given type
    pub async fn enqueue_by_message_type(
        &self,
        sender: &mpsc::Sender<i64>,
        message_type: &str,
    ) -> Result<(), IndexerError> {
        let end_block = if self.config.end_block == -1 {
            self.repositories
                .block
                .highest_indexed_height(self.chain_db_id)
                .await?
        } else {
            self.config.end_block
        };

        let heights = self
            .repositories
            .block
            .heights_with_message_type(
                message_type,
                self.config.start_block,
                end_block,
                self.chain_db_id,
            )
            .await?;

        for height in heights {
            logging::log_debug(&format!("Sending block {} to be re-indexed", height));
            self.throttle().await;
            if sender.send(height).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn throttle(&self) {
        if self.config.throttling != 0 {
            tokio::time::sleep(Duration::from_secs(self.config.throttling)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_mode_starts_past_the_highest_indexed_block() {
        assert_eq!(start_policy(-1, -1, false, 1000), StartPolicy::Height(1001));
        // Reindex flag is irrelevant when resuming
        assert_eq!(start_policy(-1, -1, true, 1000), StartPolicy::Height(1001));
    }

    #[test]
    fn reindex_mode_takes_the_configured_start() {
        assert_eq!(start_policy(50, 500, true, 1000), StartPolicy::Height(50));
    }

    #[test]
    fn range_mode_fills_the_first_gap() {
        assert_eq!(
            start_policy(50, 500, false, 1000),
            StartPolicy::FirstMissing { start: 50, end: 500 }
        );
        // Open-ended range is capped at the highest indexed block
        assert_eq!(
            start_policy(50, -1, false, 1000),
            StartPolicy::FirstMissing {
                start: 50,
                end: 1000
            }
        );
    }
}
