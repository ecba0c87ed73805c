//! Error types for the chainpoints pipeline.

use thiserror::Error;

/// Errors that can occur while indexing or applying ledger events.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// A tracked event whose payload does not match its ABI.
    #[error("Malformed log at block {block_number} index {log_index}: {reason}")]
    Decode {
        block_number: u64,
        log_index: u32,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Indexer aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}
