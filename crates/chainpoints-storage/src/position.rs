//! Column encoding of [`LogPosition`].
//!
//! | cursor        | last_log_index | block_complete |
//! |---------------|----------------|----------------|
//! | `Unstarted`   | NULL           | false          |
//! | `AfterLog(i)` | i              | false          |
//! | `Complete`    | NULL           | true           |

use chainpoints_core::{BlockCursor, IndexerError, LogPosition};

pub(crate) struct PositionColumns {
    pub last_block_indexed: i64,
    pub last_log_index: Option<i64>,
    pub block_complete: bool,
}

impl From<LogPosition> for PositionColumns {
    fn from(position: LogPosition) -> Self {
        let (last_log_index, block_complete) = match position.cursor {
            BlockCursor::Unstarted => (None, false),
            BlockCursor::AfterLog(i) => (Some(i as i64), false),
            BlockCursor::Complete => (None, true),
        };
        Self {
            last_block_indexed: position.block_number as i64,
            last_log_index,
            block_complete,
        }
    }
}

impl TryFrom<PositionColumns> for LogPosition {
    type Error = IndexerError;

    fn try_from(cols: PositionColumns) -> Result<Self, IndexerError> {
        let block = u64::try_from(cols.last_block_indexed)
            .map_err(|_| IndexerError::Storage(format!("negative block {}", cols.last_block_indexed)))?;
        Ok(match (cols.block_complete, cols.last_log_index) {
            (true, _) => LogPosition::end_of(block),
            (false, None) => LogPosition::start_of(block),
            (false, Some(i)) => {
                let i = u32::try_from(i)
                    .map_err(|_| IndexerError::Storage(format!("log index {i} out of range")))?;
                LogPosition::after_log(block, i)
            }
        })
    }
}
