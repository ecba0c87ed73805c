//! chainpoints-rpc: upstream JSON-RPC access for ChainPoints.
//!
//! # Overview
//!
//! - [`RpcTransport`]: async trait every upstream transport implements
//! - [`HttpRpcClient`]: `reqwest`-backed HTTP transport
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`]: JSON-RPC 2.0 wire types
//! - [`RetryPolicy`]: exponential backoff used by health probes and data calls
//! - [`ConnectionManager`]: owns the active endpoint, probes it periodically
//!   and fails over round-robin through the configured endpoint pool

pub mod error;
pub mod http;
pub mod manager;
pub mod policy;
pub mod request;
pub mod transport;

pub use error::TransportError;
pub use http::{HttpClientConfig, HttpRpcClient, HttpTransportFactory};
pub use manager::{ConnectionManager, ConnectionManagerConfig, HealthOutcome, TransportFactory};
pub use policy::{RetryConfig, RetryPolicy};
pub use request::{parse_quantity, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::RpcTransport;
