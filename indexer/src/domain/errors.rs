use std::error::Error;
use std::fmt;

use crate::infrastructure::persistence::error::DbError;
use crate::infrastructure::rpc::error::RpcError;

/// Classification of a block that could not be ingested. Recorded to the
/// failure ledger so the next run can reattempt it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockProcessingFailure {
    /// The node has pruned the history for this block; permanent for this node
    NodeMissingHistoryForBlock,
    /// A block-level RPC query failed; transient, retried on the next run
    BlockQueryError,
    /// The parser rejected a transaction in the block
    UnprocessableTxError,
    /// The block event loop failed for this height
    FailedBlockEventHandling,
}

impl fmt::Display for BlockProcessingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockProcessingFailure::NodeMissingHistoryForBlock => {
                write!(f, "node is missing history for block")
            }
            BlockProcessingFailure::BlockQueryError => write!(f, "block query error"),
            BlockProcessingFailure::UnprocessableTxError => write!(f, "unprocessable tx"),
            BlockProcessingFailure::FailedBlockEventHandling => {
                write!(f, "block event handling failed")
            }
        }
    }
}

/// Error type for message and transaction parsing
#[derive(Debug)]
pub enum ParseError {
    /// No decoder is registered for the message type URL. Not an error when
    /// the type is in the ignore set; a warning otherwise.
    UnknownMessage(String),
    /// A registered decoder rejected a message it advertises support for
    DecoderFailed { type_url: String, reason: String },
    /// Structural mismatch in the RPC data, e.g. block txs and tx results
    /// of different lengths. Fatal.
    Inconsistency(String),
    /// A field was missing or malformed in the payload
    MalformedField(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnknownMessage(url) => write!(f, "no handler for message type {}", url),
            ParseError::DecoderFailed { type_url, reason } => {
                write!(f, "decoder for {} failed: {}", type_url, reason)
            }
            ParseError::Inconsistency(msg) => write!(f, "parser inconsistency: {}", msg),
            ParseError::MalformedField(msg) => write!(f, "malformed field: {}", msg),
        }
    }
}

impl Error for ParseError {}

/// Top level error for the indexing pipeline
#[derive(Debug)]
pub enum IndexerError {
    Rpc(RpcError),
    Db(DbError),
    Parse(ParseError),
    /// A DB write failed twice for the same batch
    WriteFailure(String),
    /// More than 10% of recent writes needed a reattempt
    WriteFailureRateExceeded { reattempts: u64, writes: u64 },
    Config(String),
}

impl fmt::Display for IndexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexerError::Rpc(e) => write!(f, "rpc error: {}", e),
            IndexerError::Db(e) => write!(f, "database error: {}", e),
            IndexerError::Parse(e) => write!(f, "parse error: {}", e),
            IndexerError::WriteFailure(msg) => write!(f, "write failure: {}", msg),
            IndexerError::WriteFailureRateExceeded { reattempts, writes } => write!(
                f,
                "write failure rate exceeded: {} reattempts over {} writes",
                reattempts, writes
            ),
            IndexerError::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl Error for IndexerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IndexerError::Rpc(e) => Some(e),
            IndexerError::Db(e) => Some(e),
            IndexerError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RpcError> for IndexerError {
    fn from(error: RpcError) -> Self {
        IndexerError::Rpc(error)
    }
}

impl From<DbError> for IndexerError {
    fn from(error: DbError) -> Self {
        IndexerError::Db(error)
    }
}

impl From<ParseError> for IndexerError {
    fn from(error: ParseError) -> Self {
        IndexerError::Parse(error)
    }
}
