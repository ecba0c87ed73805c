//! Fluent builder for the index loop.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainpoints_core::MemoryLedgerStore;
//! use chainpoints_evm::{IndexerBuilder, ManagedRpcClient};
//! # fn example(client: ManagedRpcClient) -> Result<(), chainpoints_core::IndexerError> {
//! let index_loop = IndexerBuilder::new()
//!     .contract_address("0xBBBBBbbBBb9cC5e90e3b3Af64bdAF62C37EEFFCb")
//!     .start_block(13_977_148)
//!     .window_size(2_000)
//!     .build(client, Arc::new(MemoryLedgerStore::new()))?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;

use chainpoints_core::checkpoint::LedgerStore;
use chainpoints_core::error::IndexerError;
use chainpoints_core::indexer::{IndexerConfig, TimeBasis};
use chainpoints_rpc::policy::RetryConfig;

use crate::fetcher::{EvmFetcher, EvmRpcClient};
use crate::index_loop::IndexLoop;

#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
    initial_backoff: Option<Duration>,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: IndexerConfig) -> Self {
        Self {
            config,
            initial_backoff: None,
        }
    }

    /// Set the tracked contract.
    pub fn contract_address(mut self, address: impl Into<String>) -> Self {
        self.config.contract_address = address.into();
        self
    }

    /// Set the first block indexed on a fresh checkpoint.
    pub fn start_block(mut self, block: u64) -> Self {
        self.config.start_block = block;
        self
    }

    /// Set the number of blocks per `eth_getLogs` window.
    pub fn window_size(mut self, size: u64) -> Self {
        self.config.window_size = size;
        self
    }

    /// Set live mode polling interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn time_basis(mut self, basis: TimeBasis) -> Self {
        self.config.time_basis = basis;
        self
    }

    pub fn live_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.live_channel_capacity = capacity;
        self
    }

    /// Set how many times each upstream fetch is retried.
    pub fn max_fetch_retries(mut self, retries: u32) -> Self {
        self.config.max_fetch_retries = retries;
        self
    }

    /// Override the first retry delay (doubles on each further retry).
    pub fn fetch_backoff(mut self, initial: Duration) -> Self {
        self.initial_backoff = Some(initial);
        self
    }

    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Validate the configuration and assemble the loop.
    pub fn build<C: EvmRpcClient + 'static>(
        self,
        client: C,
        store: Arc<dyn LedgerStore>,
    ) -> Result<IndexLoop<C>, IndexerError> {
        let contract: Address = self.config.contract_address.parse().map_err(|e| {
            IndexerError::Config(format!(
                "invalid contract address {:?}: {e}",
                self.config.contract_address
            ))
        })?;
        if self.config.window_size == 0 {
            return Err(IndexerError::Config("window size must be at least 1".into()));
        }

        let mut retry = RetryConfig {
            max_retries: self.config.max_fetch_retries,
            ..RetryConfig::default()
        };
        if let Some(initial) = self.initial_backoff {
            retry.initial_backoff = initial;
            retry.max_backoff = retry.max_backoff.max(initial);
        }

        Ok(IndexLoop::new(
            self.config,
            contract,
            EvmFetcher::new(client, retry),
            store,
        ))
    }
}
