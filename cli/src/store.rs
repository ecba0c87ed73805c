//! Ledger store selection by URL scheme.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use chainpoints_core::LedgerStore;
use chainpoints_storage::{PostgresLedgerStore, SqliteLedgerStore};

pub async fn open(url: &str) -> Result<Arc<dyn LedgerStore>> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let store = PostgresLedgerStore::connect(url)
            .await
            .context("opening PostgreSQL ledger store")?;
        info!("using PostgreSQL ledger store");
        Ok(Arc::new(store))
    } else if url == "sqlite::memory:" {
        let store = SqliteLedgerStore::in_memory()
            .await
            .context("opening in-memory SQLite ledger store")?;
        info!("using in-memory SQLite ledger store");
        Ok(Arc::new(store))
    } else if url.starts_with("sqlite:") {
        let store = SqliteLedgerStore::open(url)
            .await
            .with_context(|| format!("opening SQLite ledger store at {url}"))?;
        info!(%url, "using SQLite ledger store");
        Ok(Arc::new(store))
    } else {
        bail!("unsupported storage url: {url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_in_memory_sqlite() {
        let store = open("sqlite::memory:").await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        store.init(7).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().position.block_number, 7);
    }

    #[tokio::test]
    async fn rejects_unknown_scheme() {
        assert!(open("redis://localhost").await.is_err());
    }
}
