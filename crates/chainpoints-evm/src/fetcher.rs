//! EVM block and log fetcher.
//!
//! Wraps an [`EvmRpcClient`] with bounded retry: every head, block and log
//! call is retried with exponential backoff on transient errors and the
//! final error propagates to the caller.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, warn};

use chainpoints_core::error::IndexerError;
use chainpoints_rpc::policy::{RetryConfig, RetryPolicy};

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<String>,
    #[serde(rename = "blockHash", default)]
    pub block_hash: Option<String>,
    #[serde(rename = "transactionHash", default)]
    pub tx_hash: Option<String>,
    #[serde(rename = "logIndex")]
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    /// `(block number, log index)`; fails for pending logs.
    pub fn coords(&self) -> Result<(u64, u32), IndexerError> {
        let block = self
            .block_number
            .as_deref()
            .and_then(parse_hex_u64)
            .ok_or_else(|| IndexerError::Rpc(format!("log without block number: {self:?}")))?;
        let index = self
            .log_index
            .as_deref()
            .and_then(parse_hex_u64)
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| IndexerError::Rpc(format!("log without log index: {self:?}")))?;
        Ok((block, index))
    }

    /// Returns `true` if this log was retracted by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// Block fields the indexer reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: String,
    /// Unix seconds.
    pub timestamp: i64,
}

/// `eth_getLogs` filter: one contract, optionally narrowed to a set of topic0 values.
#[derive(Debug, Clone, PartialEq)]
pub struct LogFilter {
    pub address: String,
    pub topic0: Vec<String>,
}

impl LogFilter {
    pub fn to_json(&self, from: u64, to: u64) -> Value {
        let mut filter = json!({
            "address": self.address,
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
        });
        if !self.topic0.is_empty() {
            filter["topics"] = json!([self.topic0]);
        }
        filter
    }
}

/// Upstream calls the indexer needs.
#[async_trait]
pub trait EvmRpcClient: Send + Sync {
    async fn get_block_number(&self) -> Result<u64, IndexerError>;
    async fn get_block(&self, number: u64) -> Result<Option<BlockHeader>, IndexerError>;
    async fn get_logs(&self, filter: &LogFilter, from: u64, to: u64) -> Result<Vec<RawLog>, IndexerError>;
}

/// Retrying front for an `EvmRpcClient`.
pub struct EvmFetcher<C> {
    client: C,
    retry: RetryPolicy,
}

impl<C: EvmRpcClient> EvmFetcher<C> {
    pub fn new(client: C, retry: RetryConfig) -> Self {
        Self {
            client,
            retry: RetryPolicy::new(retry),
        }
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, IndexerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, IndexerError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match call().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        warn!(op, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying upstream call");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!(op, attempt, error = %e, "upstream call failed after retries");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Current chain head.
    pub async fn head(&self) -> Result<u64, IndexerError> {
        self.with_retry("eth_blockNumber", move || self.client.get_block_number()).await
    }

    /// Timestamp of block `number`. A block the node does not know yet is
    /// retried like any other transient failure.
    pub async fn block_timestamp(&self, number: u64) -> Result<i64, IndexerError> {
        self.with_retry("eth_getBlockByNumber", move || async move {
            self.client
                .get_block(number)
                .await?
                .map(|b| b.timestamp)
                .ok_or_else(|| IndexerError::Rpc(format!("block {number} not found")))
        })
        .await
    }

    /// All logs matching `filter` in `[from, to]`, sorted by `(block, log index)`.
    pub async fn logs(&self, filter: &LogFilter, from: u64, to: u64) -> Result<Vec<RawLog>, IndexerError> {
        if to < from {
            return Ok(vec![]);
        }
        let mut logs = self
            .with_retry("eth_getLogs", move || self.client.get_logs(filter, from, to))
            .await?;
        logs.sort_by_key(|l| l.coords().ok());
        Ok(logs)
    }
}

/// Parse a hex quantity (with or without `0x`).
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    u64::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16).ok()
}

/// Convert an `eth_getBlockByNumber` result to a `BlockHeader`.
pub fn block_from_json(v: &Value) -> Option<BlockHeader> {
    Some(BlockHeader {
        number: parse_hex_u64(v["number"].as_str()?)?,
        hash: v["hash"].as_str()?.to_string(),
        timestamp: parse_hex_u64(v["timestamp"].as_str()?)? as i64,
    })
}
