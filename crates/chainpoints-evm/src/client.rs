//! `EvmRpcClient` over the connection manager.
//!
//! Each call acquires the manager's current transport, so a retry after a
//! failover automatically targets the new endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use chainpoints_core::error::IndexerError;
use chainpoints_rpc::{parse_quantity, ConnectionManager, TransportError};

use crate::fetcher::{block_from_json, BlockHeader, EvmRpcClient, LogFilter, RawLog};

pub struct ManagedRpcClient {
    manager: Arc<ConnectionManager>,
}

impl ManagedRpcClient {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, IndexerError> {
        let transport = self.manager.acquire();
        transport
            .call(self.manager.next_request_id(), method, params)
            .await
            .map_err(|e| rpc_error(transport.url(), method, e))
    }
}

/// Network failures stay retryable; errors the node answers with
/// deterministically (invalid params, range limits) do not.
fn rpc_error(url: &str, method: &str, e: TransportError) -> IndexerError {
    let msg = format!("{method} via {url}: {e}");
    if e.is_retryable() {
        IndexerError::Rpc(msg)
    } else {
        IndexerError::Other(msg)
    }
}

#[async_trait]
impl EvmRpcClient for ManagedRpcClient {
    async fn get_block_number(&self) -> Result<u64, IndexerError> {
        let v = self.call("eth_blockNumber", vec![]).await?;
        parse_quantity(&v).map_err(|e| IndexerError::Other(format!("eth_blockNumber: {e}")))
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockHeader>, IndexerError> {
        let v = self
            .call("eth_getBlockByNumber", vec![json!(format!("0x{number:x}")), json!(false)])
            .await?;
        if v.is_null() {
            return Ok(None);
        }
        block_from_json(&v)
            .map(Some)
            .ok_or_else(|| IndexerError::Other(format!("malformed block {number}: {v}")))
    }

    async fn get_logs(&self, filter: &LogFilter, from: u64, to: u64) -> Result<Vec<RawLog>, IndexerError> {
        let v = self.call("eth_getLogs", vec![filter.to_json(from, to)]).await?;
        serde_json::from_value(v).map_err(|e| IndexerError::Other(format!("malformed eth_getLogs result: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::EvmFetcher;
    use chainpoints_rpc::{
        ConnectionManagerConfig, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RetryConfig, RpcTransport,
        TransportFactory,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers from a fixed method → result table and records requests.
    struct Scripted {
        seen: Arc<Mutex<Vec<JsonRpcRequest>>>,
    }

    #[async_trait]
    impl RpcTransport for Scripted {
        async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
            let result = match req.method.as_str() {
                "eth_blockNumber" => json!("0x2a"),
                "eth_getBlockByNumber" if req.params[0] == "0x63" => Value::Null,
                "eth_getBlockByNumber" => json!({ "number": "0x10", "hash": "0xaa", "timestamp": "0x64" }),
                "eth_getLogs" => json!([{
                    "address": "0xBBBBBbbBBb9cC5e90e3b3Af64bdAF62C37EEFFCb",
                    "topics": [],
                    "data": "0x",
                    "blockNumber": "0x10",
                    "logIndex": "0x0"
                }]),
                _ => Value::Null,
            };
            self.seen.lock().unwrap().push(req.clone());
            Ok(JsonRpcResponse::success(req.id, result))
        }

        fn url(&self) -> &str {
            "mock://scripted"
        }
    }

    struct Factory(Arc<Mutex<Vec<JsonRpcRequest>>>);

    impl TransportFactory for Factory {
        fn connect(&self, _url: &str) -> Arc<dyn RpcTransport> {
            Arc::new(Scripted { seen: self.0.clone() })
        }
    }

    fn client() -> (ManagedRpcClient, Arc<Mutex<Vec<JsonRpcRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mgr = ConnectionManager::new(
            vec!["mock://scripted".into()],
            Factory(seen.clone()),
            ConnectionManagerConfig::default(),
        )
        .unwrap();
        (ManagedRpcClient::new(Arc::new(mgr)), seen)
    }

    #[tokio::test]
    async fn head_block_and_logs() {
        let (c, seen) = client();
        assert_eq!(c.get_block_number().await.unwrap(), 42);
        assert_eq!(c.get_block(16).await.unwrap().unwrap().timestamp, 100);
        assert!(c.get_block(99).await.unwrap().is_none());

        let filter = LogFilter {
            address: "0xBBBBBbbBBb9cC5e90e3b3Af64bdAF62C37EEFFCb".into(),
            topic0: vec![],
        };
        let logs = c.get_logs(&filter, 16, 16).await.unwrap();
        assert_eq!(logs[0].coords().unwrap(), (16, 0));

        let seen = seen.lock().unwrap();
        let get_logs = seen.iter().find(|r| r.method == "eth_getLogs").unwrap();
        assert_eq!(get_logs.params[0]["fromBlock"], "0x10");
    }

    /// Fails every request with a fixed transport error and counts sends.
    struct Failing {
        error: fn() -> TransportError,
        sends: Arc<AtomicU32>,
    }

    #[async_trait]
    impl RpcTransport for Failing {
        async fn send(&self, _req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }

        fn url(&self) -> &str {
            "mock://failing"
        }
    }

    struct FailingFactory(fn() -> TransportError, Arc<AtomicU32>);

    impl TransportFactory for FailingFactory {
        fn connect(&self, _url: &str) -> Arc<dyn RpcTransport> {
            Arc::new(Failing { error: self.0, sends: self.1.clone() })
        }
    }

    fn failing_fetcher(error: fn() -> TransportError) -> (EvmFetcher<ManagedRpcClient>, Arc<AtomicU32>) {
        let sends = Arc::new(AtomicU32::new(0));
        let mgr = ConnectionManager::new(
            vec!["mock://failing".into()],
            FailingFactory(error, sends.clone()),
            ConnectionManagerConfig::default(),
        )
        .unwrap();
        let retry = RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2.0,
        };
        (EvmFetcher::new(ManagedRpcClient::new(Arc::new(mgr)), retry), sends)
    }

    #[tokio::test]
    async fn node_rejections_are_not_retried() {
        let (fetcher, sends) = failing_fetcher(|| {
            TransportError::Rpc(JsonRpcError {
                code: -32602,
                message: "invalid params".into(),
                data: None,
            })
        });
        let err = fetcher.head().await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("-32602"));
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn network_failures_are_retried_until_exhausted() {
        let (fetcher, sends) = failing_fetcher(|| TransportError::Http("connection reset".into()));
        let err = fetcher.head().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(sends.load(Ordering::SeqCst), 4);
    }
}
