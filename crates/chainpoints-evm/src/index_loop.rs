//! The main index loop: backfill, then live.
//!
//! # Phase 1: BACKFILL
//! Read the head once, then walk `[checkpoint, head]` in windows of
//! `window_size` blocks. Each window's logs are applied in `(block, log index)`
//! order and the checkpoint is advanced to the window end before the next
//! window is fetched.
//!
//! # Phase 2: LIVE
//! A [`LogPoller`] feeds new logs through a bounded channel; this loop is the
//! single consumer and applies them through the same path as backfill.
//!
//! A log at or before the stored position is skipped, so a restart resumes
//! exactly after the last durably applied log.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use chainpoints_core::checkpoint::LedgerStore;
use chainpoints_core::error::IndexerError;
use chainpoints_core::indexer::{IndexerConfig, IndexerState, TimeBasis};
use chainpoints_core::ledger::PointsLedger;
use chainpoints_core::position::LogPosition;

use crate::decoder::EventDecoder;
use crate::fetcher::{EvmFetcher, EvmRpcClient, LogFilter, RawLog};
use crate::live::{LiveItem, LogPoller};

pub struct IndexLoop<C> {
    config: IndexerConfig,
    contract: Address,
    fetcher: Arc<EvmFetcher<C>>,
    decoder: EventDecoder,
    store: Arc<dyn LedgerStore>,
    position: LogPosition,
    /// Timestamp of the most recently looked-up block.
    block_time: Option<(u64, i64)>,
    state: watch::Sender<IndexerState>,
}

impl<C: EvmRpcClient + 'static> IndexLoop<C> {
    /// Use [`IndexerBuilder`](crate::builder::IndexerBuilder) to construct.
    pub(crate) fn new(
        config: IndexerConfig,
        contract: Address,
        fetcher: EvmFetcher<C>,
        store: Arc<dyn LedgerStore>,
    ) -> Self {
        let (state, _) = watch::channel(IndexerState::Idle);
        Self {
            position: LogPosition::start_of(config.start_block),
            config,
            contract,
            fetcher: Arc::new(fetcher),
            decoder: EventDecoder::new(),
            store,
            block_time: None,
            state,
        }
    }

    /// Observe phase changes.
    pub fn subscribe_state(&self) -> watch::Receiver<IndexerState> {
        self.state.subscribe()
    }

    pub fn position(&self) -> LogPosition {
        self.position
    }

    /// Run backfill then live. Returns only on a processing error.
    pub async fn run(&mut self) -> Result<(), IndexerError> {
        let result = self.run_phases().await;
        if let Err(e) = &result {
            error!(error = %e, position = %self.position, "processing error, indexer stopped");
            self.state.send_replace(IndexerState::Error);
        }
        result
    }

    async fn run_phases(&mut self) -> Result<(), IndexerError> {
        self.state.send_replace(IndexerState::Backfilling);
        let head = self.fetcher.head().await.map_err(|e| IndexerError::Aborted {
            reason: format!("cannot read chain head: {e}"),
        })?;

        let checkpoint = self.store.init(self.config.start_block).await?;
        self.position = checkpoint.position;
        let mut ledger = PointsLedger::new(Arc::clone(&self.store), &checkpoint);
        info!(
            position = %self.position,
            head,
            total_shares = checkpoint.pool.total_shares,
            "resuming from checkpoint"
        );

        self.backfill(&mut ledger, head).await?;

        self.state.send_replace(IndexerState::Live);
        let from = self.position.next_block().max(head + 1);
        info!(from, "switching to live phase");
        self.live(&mut ledger, from).await
    }

    async fn backfill(&mut self, ledger: &mut PointsLedger, head: u64) -> Result<(), IndexerError> {
        let filter = LogFilter {
            address: self.contract.to_checksum(None),
            topic0: vec![],
        };
        let window = self.config.window_size;
        let mut from = self.position.next_block();
        info!(from, head, window, "starting backfill");

        while from <= head {
            let to = head.min(from + window - 1);
            let logs = self.fetcher.logs(&filter, from, to).await?;
            for log in &logs {
                self.apply_log(ledger, log).await?;
            }
            self.advance(LogPosition::end_of(to)).await?;

            info!(from, to, head, logs = logs.len(), "backfill window applied");
            from = to + 1;
        }

        info!(at = head, "backfill complete");
        Ok(())
    }

    async fn live(&mut self, ledger: &mut PointsLedger, from_block: u64) -> Result<(), IndexerError> {
        let (tx, mut rx) = mpsc::channel(self.config.live_channel_capacity.max(1));
        let filter = LogFilter {
            address: self.contract.to_checksum(None),
            topic0: self.decoder.topics(),
        };
        let poller = LogPoller::new(
            Arc::clone(&self.fetcher),
            filter,
            Duration::from_millis(self.config.poll_interval_ms),
            self.config.window_size,
        )
        .spawn(from_block, tx);

        let result = self.consume(ledger, &mut rx).await;
        poller.abort();
        result
    }

    async fn consume(
        &mut self,
        ledger: &mut PointsLedger,
        rx: &mut mpsc::Receiver<LiveItem>,
    ) -> Result<(), IndexerError> {
        while let Some(item) = rx.recv().await {
            match item {
                LiveItem::Log(log) => self.apply_log(ledger, &log).await?,
                LiveItem::RangeComplete { to_block } => {
                    self.advance(LogPosition::end_of(to_block)).await?
                }
                LiveItem::Failed(e) => return Err(e),
            }
        }
        Err(IndexerError::Aborted {
            reason: "live log poller stopped".into(),
        })
    }

    /// Apply one log: decode, run the ledger handler, record the position.
    async fn apply_log(&mut self, ledger: &mut PointsLedger, log: &RawLog) -> Result<(), IndexerError> {
        let (block, index) = log.coords()?;
        if self.position.covers(block, index) {
            debug!(block, index, "log already applied");
            return Ok(());
        }
        if log.is_removed() {
            warn!(block, index, "skipping log removed by reorg");
            return Ok(());
        }

        let position = LogPosition::after_log(block, index);
        if log.address.parse::<Address>().ok() != Some(self.contract) {
            debug!(block, index, address = %log.address, "ignoring log from another contract");
            return self.advance(position).await;
        }

        match self.decoder.decode(log) {
            Ok(Some(event)) => {
                let timestamp = self.timestamp_for(block).await?;
                ledger.apply(&event, timestamp, position).await?;
                self.position = position;
                Ok(())
            }
            Ok(None) => {
                debug!(block, index, "ignoring untracked event");
                self.advance(position).await
            }
            Err(e) => Err(IndexerError::Decode {
                block_number: block,
                log_index: index,
                reason: e.to_string(),
            }),
        }
    }

    async fn advance(&mut self, position: LogPosition) -> Result<(), IndexerError> {
        if position > self.position {
            self.store.advance(position).await?;
            self.position = position;
        }
        Ok(())
    }

    async fn timestamp_for(&mut self, block: u64) -> Result<i64, IndexerError> {
        match self.config.time_basis {
            TimeBasis::WallClock => Ok(chrono::Utc::now().timestamp()),
            TimeBasis::Block => {
                if let Some((cached, ts)) = self.block_time {
                    if cached == block {
                        return Ok(ts);
                    }
                }
                let ts = self.fetcher.block_timestamp(block).await?;
                self.block_time = Some((block, ts));
                Ok(ts)
            }
        }
    }
}
