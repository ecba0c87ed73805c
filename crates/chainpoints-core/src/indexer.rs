//! Indexer configuration and state types.

use serde::{Deserialize, Serialize};

/// Which clock timestamps ledger events.
///
/// One basis is used for both backfill and live phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBasis {
    /// `timestamp` of the block that emitted the log. Replays are deterministic.
    #[default]
    Block,
    /// Processing time.
    WallClock,
}

/// Configuration for an indexer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Tracked contract address.
    pub contract_address: String,
    /// Block the checkpoint starts at on first run.
    pub start_block: u64,
    /// Blocks per `eth_getLogs` window during backfill.
    pub window_size: u64,
    /// Head polling interval in live mode (milliseconds).
    pub poll_interval_ms: u64,
    pub time_basis: TimeBasis,
    /// Capacity of the channel between the live poller and the consumer.
    pub live_channel_capacity: usize,
    /// Retries for each head/block/log fetch before giving up.
    pub max_fetch_retries: u32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            contract_address: String::new(),
            start_block: 0,
            window_size: 1000,
            poll_interval_ms: 4000,
            time_basis: TimeBasis::Block,
            live_channel_capacity: 256,
            max_fetch_retries: 3,
        }
    }
}

/// Runtime state of the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not yet started.
    Idle,
    /// Replaying history up to the head observed at startup.
    Backfilling,
    /// Following new logs as they arrive.
    Live,
    /// Terminated by a processing error.
    Error,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Backfilling => write!(f, "backfilling"),
            Self::Live => write!(f, "live"),
            Self::Error => write!(f, "error"),
        }
    }
}
