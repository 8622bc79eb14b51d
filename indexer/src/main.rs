//! Cosmos chain indexer.
//!
//! The `index` subcommand tails the configured chain, extracting taxable
//! transfers, fees, and block/epoch lifecycle events into PostgreSQL. It is
//! intended to run as a long-lived background service; all flags can also
//! be set through the environment (see `config`).

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use cosmos_indexer::application::indexer::{wait_for_chain_ready, Indexer};
use cosmos_indexer::application::tasks;
use cosmos_indexer::config::AppConfig;
use cosmos_indexer::domain::errors::IndexerError;
use cosmos_indexer::domain::services::{event_parser, messages, EventRelevanceRegistry};
use cosmos_indexer::infrastructure::persistence::{DbPool, RepositoryFactory};
use cosmos_indexer::infrastructure::rpc::{NodeClient, NodeClientConfig};
use cosmos_indexer::utils::logging;

/// Cosmos chain indexer CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the blockchain according to the configuration defined
    Index(IndexArgs),
}

/// Flags for the index subcommand; every flag overrides its env default
#[derive(Args)]
struct IndexArgs {
    /// Reindex only the blocks containing the message type provided
    #[arg(long = "re-index-message-type")]
    re_index_message_type: Option<String>,
    /// First block to index; -1 resumes from the highest indexed block
    #[arg(long = "start-block")]
    start_block: Option<i64>,
    /// Last block to index; -1 runs indefinitely
    #[arg(long = "end-block")]
    end_block: Option<i64>,
    /// Re-index blocks even when already marked indexed
    #[arg(long)]
    reindex: bool,
    /// Skip draining the failed-block ledger at startup
    #[arg(long = "prevent-reattempts")]
    prevent_reattempts: bool,
    /// Consume batches without writing to the database
    #[arg(long = "dry-run")]
    dry_run: bool,
    /// Block at startup until the node reports caught-up
    #[arg(long = "wait-for-chain")]
    wait_for_chain: bool,
    /// Seconds between catch-up status polls
    #[arg(long = "wait-for-chain-delay")]
    wait_for_chain_delay: Option<u64>,
    /// Stop once the current height passes the node tip
    #[arg(long = "exit-when-caught-up")]
    exit_when_caught_up: bool,
    /// Seconds to sleep between enqueued heights
    #[arg(long)]
    throttling: Option<u64>,
    /// Log throughput every N tx-batch writes
    #[arg(long = "block-timer")]
    block_timer: Option<u64>,
    /// Number of RPC worker tasks (clamped to 1..=64)
    #[arg(long = "rpc-workers")]
    rpc_workers: Option<u64>,
    /// Attempts for the retrying block-results query
    #[arg(long = "rpc-retry-attempts")]
    rpc_retry_attempts: Option<u64>,
    /// Backoff cap in seconds for the retrying block-results query
    #[arg(long = "rpc-retry-max-wait")]
    rpc_retry_max_wait: Option<u64>,
    /// Enable the tx indexing pipeline
    #[arg(long = "chain-indexing-enabled")]
    chain_indexing_enabled: Option<bool>,
    /// Enable the begin/end block event loop
    #[arg(long = "block-event-indexing-enabled")]
    block_event_indexing_enabled: Option<bool>,
    /// Enable the epoch event loop
    #[arg(long = "epoch-event-indexing-enabled")]
    epoch_event_indexing_enabled: Option<bool>,
    /// First height for the block event loop; 0 resumes from the DB
    #[arg(long = "block-events-start-block")]
    block_events_start_block: Option<i64>,
    /// Last height for the block event loop; -1 runs indefinitely
    #[arg(long = "block-events-end-block")]
    block_events_end_block: Option<i64>,
    /// First epoch number for the epoch event loop
    #[arg(long = "epoch-events-start-epoch")]
    epoch_events_start_epoch: Option<i64>,
    /// Last epoch number for the epoch event loop
    #[arg(long = "epoch-events-end-epoch")]
    epoch_events_end_epoch: Option<i64>,
    /// Epoch identifier to index (e.g. "day")
    #[arg(long = "epoch-indexing-identifier")]
    epoch_indexing_identifier: Option<String>,
}

impl IndexArgs {
    /// Overlay the CLI flags onto the env-derived configuration
    fn apply(self, config: &mut AppConfig) {
        let indexing = &mut config.indexing;
        if let Some(v) = self.re_index_message_type {
            indexing.reindex_message_type = v;
        }
        if let Some(v) = self.start_block {
            indexing.start_block = v;
        }
        if let Some(v) = self.end_block {
            indexing.end_block = v;
        }
        if self.reindex {
            indexing.reindex = true;
        }
        if self.prevent_reattempts {
            indexing.prevent_reattempts = true;
        }
        if self.dry_run {
            indexing.dry_run = true;
        }
        if self.wait_for_chain {
            indexing.wait_for_chain = true;
        }
        if let Some(v) = self.wait_for_chain_delay {
            indexing.wait_for_chain_delay = v;
        }
        if self.exit_when_caught_up {
            indexing.exit_when_caught_up = true;
        }
        if let Some(v) = self.throttling {
            indexing.throttling = v;
        }
        if let Some(v) = self.block_timer {
            indexing.block_timer = v;
        }
        if let Some(v) = self.rpc_workers {
            indexing.rpc_workers = v;
        }
        if let Some(v) = self.rpc_retry_attempts {
            indexing.rpc_retry_attempts = v;
        }
        if let Some(v) = self.rpc_retry_max_wait {
            indexing.rpc_retry_max_wait = v;
        }
        if let Some(v) = self.chain_indexing_enabled {
            indexing.chain_indexing_enabled = v;
        }
        if let Some(v) = self.block_event_indexing_enabled {
            indexing.block_event_indexing_enabled = v;
        }
        if let Some(v) = self.epoch_event_indexing_enabled {
            indexing.epoch_event_indexing_enabled = v;
        }
        if let Some(v) = self.block_events_start_block {
            indexing.block_events_start_block = v;
        }
        if let Some(v) = self.block_events_end_block {
            indexing.block_events_end_block = v;
        }
        if let Some(v) = self.epoch_events_start_epoch {
            indexing.epoch_events_start_epoch = v;
        }
        if let Some(v) = self.epoch_events_end_epoch {
            indexing.epoch_events_end_epoch = v;
        }
        if let Some(v) = self.epoch_indexing_identifier {
            indexing.epoch_indexing_identifier = v;
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init_logger();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env();

    match cli.command {
        Commands::Index(args) => {
            args.apply(&mut config);
            if let Err(e) = run_index(config).await {
                logging::log_error(&format!("Indexer failed: {}", e));
                std::process::exit(1);
            }
        }
    }
}

async fn run_index(config: AppConfig) -> Result<(), IndexerError> {
    // Chain-specific bootstrap happens once, then the registries are
    // sealed and shared read-only across the pipeline
    let mut registry =
        messages::standard_registry().map_err(|e| IndexerError::Config(e.to_string()))?;
    messages::register_chain_handlers(&mut registry, &config.chain.chain_id)
        .map_err(|e| IndexerError::Config(e.to_string()))?;
    registry.seal();

    let mut event_registry = EventRelevanceRegistry::new();
    event_parser::register_chain_event_handlers(&mut event_registry, &config.chain.chain_id)
        .map_err(|e| IndexerError::Config(e.to_string()))?;
    event_registry.seal();

    let db_pool = DbPool::new(&config).await?;
    let repositories = RepositoryFactory::create_repositories(&db_pool);

    let client = NodeClient::new(&node_client_config(&config))?;

    // Depending on the app configuration, wait for the chain to catch up
    wait_for_chain_ready(&client, &config).await?;

    let chain_db_id = repositories
        .chain
        .get_or_create_chain(&config.chain.chain_id, &config.chain.chain_name)
        .await?;

    // Periodic denom metadata refresh, stopped by the pipeline once the
    // enqueuer finishes
    let scheduler = tasks::start_denom_refresh(&config.denom_refresh, repositories.denom.clone());

    let indexer = Indexer::new(
        config,
        client,
        repositories,
        Arc::new(registry),
        Arc::new(event_registry),
        chain_db_id,
    );

    indexer.run(scheduler).await
}

fn node_client_config(config: &AppConfig) -> NodeClientConfig {
    NodeClientConfig {
        chain_id: config.chain.chain_id.clone(),
        rpc_addr: config.chain.rpc_addr.clone(),
        api_addr: config.chain.api_addr.clone(),
        account_prefix: config.chain.account_prefix.clone(),
        keyring_backend: config.chain.keyring_backend.clone(),
        home_path: config.chain.home_path.clone(),
        key_name: config.chain.key_name.clone(),
        timeout: Duration::from_secs(10),
        eof_retry_delay: Duration::from_secs(config.indexing.wait_for_chain_delay),
    }
}
