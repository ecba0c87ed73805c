//! The `RpcTransport` trait: the seam between the connection manager and
//! the wire.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// An upstream JSON-RPC endpoint.
///
/// Implementations must be `Send + Sync` and are shared as
/// `Arc<dyn RpcTransport>`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single JSON-RPC request and return the raw response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// The endpoint URL this transport is bound to.
    fn url(&self) -> &str;

    /// Call `method` and return its `result` value.
    async fn call(
        &self,
        id: u64,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, TransportError> {
        let req = JsonRpcRequest::new(id, method, params);
        let resp = self.send(req).await?;
        resp.into_result().map_err(TransportError::Rpc)
    }
}
