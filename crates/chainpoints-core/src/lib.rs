//! chainpoints-core: the accounting half of the ChainPoints pipeline.
//!
//! # Architecture
//!
//! ```text
//! IndexLoop (chainpoints-evm)
//!     └── PointsLedger ──── accrual (reward-per-share index)
//!             └── LedgerStore = CheckpointStore + ParticipantStore
//!                     ├── MemoryLedgerStore   (this crate)
//!                     └── SQLite / Postgres   (chainpoints-storage)
//! ```
//!
//! The ledger is the single writer of the pool aggregate and of participant
//! rows. Every applied event is persisted together with the log position
//! that produced it, in one store commit.

pub mod accrual;
pub mod checkpoint;
pub mod error;
pub mod indexer;
pub mod ledger;
pub mod memory;
pub mod participant;
pub mod position;
pub mod types;

pub use accrual::{PoolState, RATE_PER_SECOND};
pub use checkpoint::{CheckpointStore, LedgerCommit, LedgerStore, SystemCheckpoint};
pub use error::IndexerError;
pub use indexer::{IndexerConfig, IndexerState, TimeBasis};
pub use ledger::{PointsLedger, DEFAULT_LEADERBOARD_LIMIT};
pub use memory::MemoryLedgerStore;
pub use participant::{LeaderboardEntry, Participant, ParticipantStore};
pub use position::{BlockCursor, LogPosition};
pub use types::LedgerEvent;
