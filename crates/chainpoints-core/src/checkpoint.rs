//! The singleton system checkpoint and the storage traits that persist it.
//!
//! The checkpoint holds both indexing progress (a [`LogPosition`]) and the
//! pool aggregate the ledger needs to resume accrual. On restart the indexer
//! loads it and resumes right after the last durably applied log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::accrual::PoolState;
use crate::error::IndexerError;
use crate::participant::{Participant, ParticipantStore};
use crate::position::LogPosition;

/// The persisted singleton row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemCheckpoint {
    pub position: LogPosition,
    pub pool: PoolState,
    /// Unix timestamp of the last write.
    pub updated_at: i64,
}

impl SystemCheckpoint {
    /// Initial state: nothing indexed at or after `start_block`, empty pool.
    pub fn genesis(start_block: u64) -> Self {
        Self {
            position: LogPosition::start_of(start_block),
            pool: PoolState::default(),
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn last_block_indexed(&self) -> u64 {
        self.position.block_number
    }
}

/// Everything one ledger handler writes, committed atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerCommit {
    /// Upserted participant row; `None` when the event had no known participant.
    pub participant: Option<Participant>,
    pub pool: PoolState,
    /// Position of the log that produced this commit.
    pub position: LogPosition,
}

/// Persistence for the checkpoint row.
///
/// Implementations: `MemoryLedgerStore`, `SqliteLedgerStore`, `PostgresLedgerStore`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self) -> Result<Option<SystemCheckpoint>, IndexerError>;

    /// Create the checkpoint at `start_block` unless it exists; return the stored row.
    async fn init(&self, start_block: u64) -> Result<SystemCheckpoint, IndexerError>;

    /// Move the position forward. A position at or before the stored one is ignored.
    async fn advance(&self, position: LogPosition) -> Result<(), IndexerError>;
}

/// Full ledger persistence: checkpoint plus participants, with an atomic
/// commit covering both.
#[async_trait]
pub trait LedgerStore: CheckpointStore + ParticipantStore {
    /// Upsert the participant, overwrite the pool aggregate and advance the
    /// position in a single transaction.
    async fn commit(&self, commit: LedgerCommit) -> Result<(), IndexerError>;
}
