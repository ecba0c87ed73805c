//! HTTP JSON-RPC transport backed by `reqwest`.
//!
//! The transport makes exactly one attempt per request. Retrying is the
//! caller's decision: the connection manager retries health probes, the
//! indexing engine retries data calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::manager::TransportFactory;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

/// Configuration for `HttpRpcClient`.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP JSON-RPC client bound to one endpoint URL.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpRpcClient {
    /// Create a client for `url` with its own connection pool.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = build_http(&config)?;
        Ok(Self::with_client(url, http, config.request_timeout))
    }

    /// Create a client that shares an existing `reqwest::Client`.
    pub fn with_client(url: impl Into<String>, http: reqwest::Client, request_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            http,
            request_timeout,
        }
    }

    fn map_reqwest(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

fn build_http(config: &HttpClientConfig) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let body = resp.bytes().await.map_err(|e| self.map_reqwest(e))?;
        Ok(serde_json::from_slice::<JsonRpcResponse>(&body)?)
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// Builds `HttpRpcClient`s for the connection manager, all sharing one
/// `reqwest` connection pool.
#[derive(Clone)]
pub struct HttpTransportFactory {
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTransportFactory {
    pub fn new(config: HttpClientConfig) -> Result<Self, TransportError> {
        Ok(Self {
            http: build_http(&config)?,
            request_timeout: config.request_timeout,
        })
    }
}

impl TransportFactory for HttpTransportFactory {
    fn connect(&self, url: &str) -> Arc<dyn RpcTransport> {
        Arc::new(HttpRpcClient::with_client(url, self.http.clone(), self.request_timeout))
    }
}
