//! Application configuration.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. a TOML file (`--config <path>`, else `./chainpoints.toml` if present)
//! 3. environment variables: `CHAINPOINTS__<SECTION>__<KEY>`, e.g.
//!    `CHAINPOINTS__RPC__URLS=https://a,https://b` or
//!    `CHAINPOINTS__INDEXER__START_BLOCK=18883124`

use std::path::Path;

use anyhow::{bail, Context, Result};
use config::{Environment, File, Source};
use serde::{Deserialize, Serialize};

use chainpoints_core::{IndexerConfig, TimeBasis};

use crate::logging::LogConfig;

pub const ENV_PREFIX: &str = "CHAINPOINTS";
pub const DEFAULT_CONFIG_FILE: &str = "chainpoints";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub rpc: RpcSettings,
    pub indexer: IndexerSettings,
    pub storage: StorageSettings,
    pub server: ServerSettings,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    /// Endpoint pool, tried in order on rotation.
    pub urls: Vec<String>,
    pub poll_interval_ms: u64,
    pub health_check_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            poll_interval_ms: 4_000,
            health_check_interval_secs: 3,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerSettings {
    pub contract_address: String,
    pub start_block: u64,
    pub window_size: u64,
    pub time_basis: TimeBasis,
    pub live_channel_capacity: usize,
    pub max_fetch_retries: u32,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        let d = IndexerConfig::default();
        Self {
            contract_address: d.contract_address,
            start_block: d.start_block,
            window_size: d.window_size,
            time_basis: d.time_basis,
            live_channel_capacity: d.live_channel_capacity,
            max_fetch_retries: d.max_fetch_retries,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// `sqlite:<path>` or `postgres://…`
    pub url: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            url: "sqlite:chainpoints.db?mode=rwc".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".into(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (required if given) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_sources(File::from(p).required(true), environment()),
            None => Self::from_sources(
                File::with_name(DEFAULT_CONFIG_FILE).required(false),
                environment(),
            ),
        }
    }

    fn from_sources<S>(file: S, env: Environment) -> Result<Self>
    where
        S: Source + Send + Sync + 'static,
    {
        let config: Self = config::Config::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .context("reading configuration sources")?
            .try_deserialize()
            .context("invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that do not need the network. The contract address is parsed
    /// when the indexer is built.
    pub fn validate(&self) -> Result<()> {
        if self.rpc.urls.is_empty() {
            bail!("rpc.urls: endpoint pool is empty");
        }
        if let Some(i) = self.rpc.urls.iter().position(|u| u.trim().is_empty()) {
            bail!("rpc.urls[{i}] is blank");
        }
        if self.indexer.window_size == 0 {
            bail!("indexer.window_size must be positive");
        }
        if self.indexer.live_channel_capacity == 0 {
            bail!("indexer.live_channel_capacity must be positive");
        }
        let url = &self.storage.url;
        if !(url.starts_with("sqlite:")
            || url.starts_with("postgres://")
            || url.starts_with("postgresql://"))
        {
            bail!("storage.url must start with sqlite:, postgres:// or postgresql://");
        }
        Ok(())
    }

    /// Settings for the index loop.
    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            contract_address: self.indexer.contract_address.clone(),
            start_block: self.indexer.start_block,
            window_size: self.indexer.window_size,
            poll_interval_ms: self.rpc.poll_interval_ms,
            time_basis: self.indexer.time_basis,
            live_channel_capacity: self.indexer.live_channel_capacity,
            max_fetch_retries: self.indexer.max_fetch_retries,
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("rpc.urls")
        .try_parsing(true)
}
