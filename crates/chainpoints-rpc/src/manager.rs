//! Connection manager: a single active upstream endpoint with periodic
//! liveness probing and round-robin failover.
//!
//! Readers call [`ConnectionManager::acquire`] and get whatever transport is
//! active at that instant. The health loop is the only writer; it swaps the
//! active `(index, transport)` pair under a write lock, so a reader sees
//! either the old or the new endpoint and never a mix of both.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::policy::{RetryConfig, RetryPolicy};
use crate::request::parse_quantity;
use crate::transport::RpcTransport;

/// Builds a transport bound to one endpoint URL.
pub trait TransportFactory: Send + Sync + 'static {
    fn connect(&self, url: &str) -> Arc<dyn RpcTransport>;
}

/// Configuration for the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionManagerConfig {
    /// Pause between health cycles.
    pub health_check_interval: Duration,
    /// Probe schedule within one health cycle.
    pub probe_retry: RetryConfig,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(3),
            probe_retry: RetryConfig::health_probe(),
        }
    }
}

/// Result of one health cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    /// The active endpoint answered a probe.
    Healthy,
    /// The active endpoint was declared unhealthy and the next one installed.
    Rotated { from: usize, to: usize },
    /// Single-endpoint pool: the unhealthy endpoint was reconnected in place.
    Reconnected { index: usize },
}

struct Active {
    index: usize,
    transport: Arc<dyn RpcTransport>,
}

/// Owns the endpoint pool and the currently selected transport.
pub struct ConnectionManager {
    endpoints: Vec<String>,
    factory: Box<dyn TransportFactory>,
    active: RwLock<Active>,
    probe: RetryPolicy,
    health_check_interval: Duration,
    request_ids: AtomicU64,
}

impl ConnectionManager {
    /// Connect to the first endpoint of a non-empty pool.
    pub fn new(
        endpoints: Vec<String>,
        factory: impl TransportFactory,
        config: ConnectionManagerConfig,
    ) -> Result<Self, TransportError> {
        let first = endpoints.first().ok_or(TransportError::EmptyEndpointPool)?;
        let transport = factory.connect(first);
        info!(url = %first, pool = endpoints.len(), "connected to upstream endpoint");

        Ok(Self {
            active: RwLock::new(Active { index: 0, transport }),
            endpoints,
            factory: Box::new(factory),
            probe: RetryPolicy::new(config.probe_retry),
            health_check_interval: config.health_check_interval,
            request_ids: AtomicU64::new(1),
        })
    }

    /// The currently selected transport. Never fails; the handle may still be
    /// unhealthy until the next health cycle rotates it.
    pub fn acquire(&self) -> Arc<dyn RpcTransport> {
        Arc::clone(&self.read_active().transport)
    }

    /// Index and URL of the active endpoint.
    pub fn current(&self) -> (usize, String) {
        let active = self.read_active();
        (active.index, self.endpoints[active.index].clone())
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Monotonic JSON-RPC request id shared by all callers.
    pub fn next_request_id(&self) -> u64 {
        self.request_ids.fetch_add(1, Ordering::Relaxed)
    }

    fn read_active(&self) -> std::sync::RwLockReadGuard<'_, Active> {
        // a poisoned lock still holds a complete (index, transport) pair
        self.active.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one health cycle: probe the active endpoint up to the configured
    /// number of attempts and rotate if every probe failed.
    pub async fn check_and_rotate(&self) -> HealthOutcome {
        let (index, transport) = {
            let active = self.read_active();
            (active.index, Arc::clone(&active.transport))
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match transport
                .call(self.next_request_id(), "eth_blockNumber", vec![])
                .await
            {
                Ok(_) => {
                    debug!(url = %transport.url(), "health probe ok");
                    return HealthOutcome::Healthy;
                }
                Err(e) => {
                    warn!(attempt, url = %transport.url(), error = %e, "health probe failed");
                    match self.probe.next_delay(attempt) {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => break,
                    }
                }
            }
        }

        self.rotate_from(index)
    }

    fn rotate_from(&self, index: usize) -> HealthOutcome {
        let next = (index + 1) % self.endpoints.len();
        let transport = self.factory.connect(&self.endpoints[next]);

        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        active.index = next;
        active.transport = transport;

        if next == index {
            warn!(url = %self.endpoints[index], "tried to rotate to the same endpoint; reconnected");
            HealthOutcome::Reconnected { index }
        } else {
            info!(
                from = %self.endpoints[index],
                to = %self.endpoints[next],
                "switched upstream endpoint"
            );
            HealthOutcome::Rotated { from: index, to: next }
        }
    }

    /// Spawn the background health loop. It runs until the handle is aborted.
    pub fn spawn_health_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(manager.health_check_interval).await;
                manager.check_and_rotate().await;
            }
        })
    }

    /// Probe every configured endpoint once and report its head block.
    pub async fn probe_endpoints(&self) -> Vec<(String, Result<u64, TransportError>)> {
        let mut out = Vec::with_capacity(self.endpoints.len());
        for url in &self.endpoints {
            let transport = self.factory.connect(url);
            let head = match transport
                .call(self.next_request_id(), "eth_blockNumber", vec![])
                .await
            {
                Ok(v) => parse_quantity(&v),
                Err(e) => Err(e),
            };
            out.push((url.clone(), head));
        }
        out
    }
}
