//! Live log subscription.
//!
//! A poller task asks for the head every `poll_interval`, fetches the tracked
//! events for the new range and pushes them into a bounded channel. The
//! index loop is the channel's only consumer and applies items in order.
//! A `RangeComplete` marker follows each fetched range so the consumer can
//! advance the checkpoint through ranges without tracked logs. A fetch that
//! still fails after the fetcher's retries is sent as `Failed` and ends the
//! task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use chainpoints_core::error::IndexerError;

use crate::fetcher::{EvmFetcher, EvmRpcClient, LogFilter, RawLog};

#[derive(Debug)]
pub enum LiveItem {
    Log(RawLog),
    /// Every log up to and including `to_block` has been delivered.
    RangeComplete { to_block: u64 },
    /// Upstream retries were exhausted; nothing follows.
    Failed(IndexerError),
}

pub struct LogPoller<C> {
    fetcher: Arc<EvmFetcher<C>>,
    filter: LogFilter,
    poll_interval: Duration,
    max_range: u64,
}

impl<C: EvmRpcClient + 'static> LogPoller<C> {
    pub fn new(fetcher: Arc<EvmFetcher<C>>, filter: LogFilter, poll_interval: Duration, max_range: u64) -> Self {
        Self {
            fetcher,
            filter,
            poll_interval,
            max_range: max_range.max(1),
        }
    }

    /// Start polling at `from_block`. The task ends when the receiver is
    /// dropped or after sending `Failed`.
    pub fn spawn(self, from_block: u64, tx: mpsc::Sender<LiveItem>) -> JoinHandle<()> {
        tokio::spawn(self.run(from_block, tx))
    }

    async fn run(self, mut next_block: u64, tx: mpsc::Sender<LiveItem>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let head = match self.fetcher.head().await {
                Ok(h) => h,
                Err(e) => {
                    error!(error = %e, "live head poll failed");
                    let _ = tx.send(LiveItem::Failed(e)).await;
                    return;
                }
            };

            while next_block <= head {
                let to = head.min(next_block + self.max_range - 1);
                let logs = match self.fetcher.logs(&self.filter, next_block, to).await {
                    Ok(logs) => logs,
                    Err(e) => {
                        error!(from = next_block, to, error = %e, "live log fetch failed");
                        let _ = tx.send(LiveItem::Failed(e)).await;
                        return;
                    }
                };
                debug!(from = next_block, to, logs = logs.len(), "live range fetched");

                for log in logs {
                    if tx.send(LiveItem::Log(log)).await.is_err() {
                        return;
                    }
                }
                if tx.send(LiveItem::RangeComplete { to_block: to }).await.is_err() {
                    return;
                }
                next_block = to + 1;
            }
        }
    }
}
