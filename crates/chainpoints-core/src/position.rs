//! Log position: the indexer's resumable place in the chain.
//!
//! A position is a block number plus how far into that block processing has
//! got. Positions are totally ordered the way logs are ordered on chain, so
//! "has this log already been applied?" is a single comparison.

use serde::{Deserialize, Serialize};

/// Progress within a single block.
///
/// Variant order is significant: `Unstarted < AfterLog(_) < Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BlockCursor {
    /// No log of the block has been applied yet.
    Unstarted,
    /// Logs up to and including this log index have been applied.
    AfterLog(u32),
    /// Every log of the block has been applied.
    Complete,
}

/// `(block, cursor)` pair, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogPosition {
    pub block_number: u64,
    pub cursor: BlockCursor,
}

impl LogPosition {
    /// Position before any log of `block_number`.
    pub fn start_of(block_number: u64) -> Self {
        Self {
            block_number,
            cursor: BlockCursor::Unstarted,
        }
    }

    /// Position right after the log `(block_number, log_index)`.
    pub fn after_log(block_number: u64, log_index: u32) -> Self {
        Self {
            block_number,
            cursor: BlockCursor::AfterLog(log_index),
        }
    }

    /// Position after the last log of `block_number`.
    pub fn end_of(block_number: u64) -> Self {
        Self {
            block_number,
            cursor: BlockCursor::Complete,
        }
    }

    /// Returns `true` if the log `(block_number, log_index)` is at or before
    /// this position and must not be applied again.
    pub fn covers(&self, block_number: u64, log_index: u32) -> bool {
        Self::after_log(block_number, log_index) <= *self
    }

    /// First block that may still hold unapplied logs.
    pub fn next_block(&self) -> u64 {
        match self.cursor {
            BlockCursor::Complete => self.block_number + 1,
            _ => self.block_number,
        }
    }

    /// `Some(index)` when processing stopped part-way through a block.
    pub fn last_log_index(&self) -> Option<u32> {
        match self.cursor {
            BlockCursor::AfterLog(i) => Some(i),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.cursor {
            BlockCursor::Unstarted => write!(f, "{}:start", self.block_number),
            BlockCursor::AfterLog(i) => write!(f, "{}:{}", self.block_number, i),
            BlockCursor::Complete => write!(f, "{}:end", self.block_number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_chain_order() {
        assert!(LogPosition::start_of(10) < LogPosition::after_log(10, 0));
        assert!(LogPosition::after_log(10, 0) < LogPosition::after_log(10, 7));
        assert!(LogPosition::after_log(10, 7) < LogPosition::end_of(10));
        assert!(LogPosition::end_of(10) < LogPosition::start_of(11));
    }

    #[test]
    fn covers_applied_logs_only() {
        let pos = LogPosition::after_log(100, 3);
        assert!(pos.covers(99, 40));
        assert!(pos.covers(100, 3));
        assert!(!pos.covers(100, 4));
        assert!(!pos.covers(101, 0));

        assert!(!LogPosition::start_of(100).covers(100, 0));
        assert!(LogPosition::end_of(100).covers(100, 999));
    }

    #[test]
    fn next_block_resumes_inside_partial_block() {
        assert_eq!(LogPosition::start_of(5).next_block(), 5);
        assert_eq!(LogPosition::after_log(5, 2).next_block(), 5);
        assert_eq!(LogPosition::end_of(5).next_block(), 6);
    }
}
