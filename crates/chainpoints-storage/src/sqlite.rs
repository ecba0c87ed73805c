//! SQLite ledger store.
//!
//! # Usage
//! ```rust,no_run
//! use chainpoints_storage::sqlite::SqliteLedgerStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteLedgerStore::open("./points.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteLedgerStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainpoints_core::{
    CheckpointStore, IndexerError, LeaderboardEntry, LedgerCommit, LedgerStore, LogPosition,
    Participant, ParticipantStore, PoolState, SystemCheckpoint,
};

use crate::position::PositionColumns;

fn storage_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// SQLite-backed ledger: one checkpoint row plus the participants table.
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Open (or create) a database at `path`.
    ///
    /// Accepts a plain file path (`"./points.db"`) or a full SQLite URL
    /// (`"sqlite:./points.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database, lost when the store is dropped.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        // the database is dropped with its last connection, so hold one open
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS system_checkpoint (
                id                 INTEGER PRIMARY KEY CHECK (id = 1),
                last_block_indexed INTEGER NOT NULL,
                last_log_index     INTEGER,
                block_complete     INTEGER NOT NULL,
                total_shares       REAL    NOT NULL,
                last_update        INTEGER NOT NULL,
                points_per_share   REAL    NOT NULL,
                updated_at         INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        // seq preserves first-appearance order for leaderboard ties
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS participants (
                seq                   INTEGER PRIMARY KEY AUTOINCREMENT,
                address               TEXT    NOT NULL UNIQUE,
                points                REAL    NOT NULL,
                shares                REAL    NOT NULL,
                points_per_share_paid REAL    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

fn checkpoint_from_row(row: &SqliteRow) -> Result<SystemCheckpoint, IndexerError> {
    let position = LogPosition::try_from(PositionColumns {
        last_block_indexed: row.get("last_block_indexed"),
        last_log_index: row.get("last_log_index"),
        block_complete: row.get::<i64, _>("block_complete") != 0,
    })?;
    Ok(SystemCheckpoint {
        position,
        pool: PoolState {
            total_shares: row.get("total_shares"),
            last_update: row.get("last_update"),
            points_per_share: row.get("points_per_share"),
        },
        updated_at: row.get("updated_at"),
    })
}

fn participant_from_row(row: &SqliteRow) -> Participant {
    Participant {
        address: row.get("address"),
        points: row.get("points"),
        shares: row.get("shares"),
        points_per_share_paid: row.get("points_per_share_paid"),
    }
}

const SELECT_CHECKPOINT: &str = "SELECT last_block_indexed, last_log_index, block_complete,
        total_shares, last_update, points_per_share, updated_at
     FROM system_checkpoint WHERE id = 1";

async fn load_in(conn: &mut SqliteConnection) -> Result<Option<SystemCheckpoint>, IndexerError> {
    let row = sqlx::query(SELECT_CHECKPOINT)
        .fetch_optional(conn)
        .await
        .map_err(storage_err)?;
    row.as_ref().map(checkpoint_from_row).transpose()
}

/// Write `position` if it is ahead of the stored one; always bump `updated_at`.
async fn advance_in(conn: &mut SqliteConnection, position: LogPosition) -> Result<(), IndexerError> {
    let current = load_in(&mut *conn)
        .await?
        .ok_or_else(|| IndexerError::Storage("checkpoint not initialised".into()))?;
    let target = position.max(current.position);
    let cols = PositionColumns::from(target);

    sqlx::query(
        "UPDATE system_checkpoint
         SET last_block_indexed = ?, last_log_index = ?, block_complete = ?, updated_at = ?
         WHERE id = 1",
    )
    .bind(cols.last_block_indexed)
    .bind(cols.last_log_index)
    .bind(cols.block_complete as i64)
    .bind(chrono::Utc::now().timestamp())
    .execute(conn)
    .await
    .map_err(storage_err)?;
    Ok(())
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteLedgerStore {
    async fn load(&self) -> Result<Option<SystemCheckpoint>, IndexerError> {
        let mut conn = self.pool.acquire().await.map_err(storage_err)?;
        load_in(&mut *conn).await
    }

    async fn init(&self, start_block: u64) -> Result<SystemCheckpoint, IndexerError> {
        let genesis = SystemCheckpoint::genesis(start_block);
        let cols = PositionColumns::from(genesis.position);

        sqlx::query(
            "INSERT OR IGNORE INTO system_checkpoint
             (id, last_block_indexed, last_log_index, block_complete,
              total_shares, last_update, points_per_share, updated_at)
             VALUES (1, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(cols.last_block_indexed)
        .bind(cols.last_log_index)
        .bind(cols.block_complete as i64)
        .bind(genesis.pool.total_shares)
        .bind(genesis.pool.last_update)
        .bind(genesis.pool.points_per_share)
        .bind(genesis.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        let stored = self
            .load()
            .await?
            .ok_or_else(|| IndexerError::Storage("checkpoint missing after init".into()))?;
        debug!(position = %stored.position, "checkpoint ready");
        Ok(stored)
    }

    async fn advance(&self, position: LogPosition) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        advance_in(&mut *tx, position).await?;
        tx.commit().await.map_err(storage_err)?;
        debug!(%position, "checkpoint advanced");
        Ok(())
    }
}

// ─── ParticipantStore impl ───────────────────────────────────────────────────

#[async_trait]
impl ParticipantStore for SqliteLedgerStore {
    async fn participant(&self, address: &str) -> Result<Option<Participant>, IndexerError> {
        let row = sqlx::query(
            "SELECT address, points, shares, points_per_share_paid
             FROM participants WHERE address = ?",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.as_ref().map(participant_from_row))
    }

    async fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, IndexerError> {
        let rows = sqlx::query(
            "SELECT p.address,
                    p.points + p.shares * (COALESCE(c.points_per_share, 0) - p.points_per_share_paid)
                        AS effective
             FROM participants p
             LEFT JOIN system_checkpoint c ON c.id = 1
             ORDER BY effective DESC, p.seq ASC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .iter()
            .map(|r| LeaderboardEntry {
                address: r.get("address"),
                points: r.get("effective"),
            })
            .collect())
    }

    async fn participants(&self) -> Result<Vec<Participant>, IndexerError> {
        let rows = sqlx::query(
            "SELECT address, points, shares, points_per_share_paid
             FROM participants ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(rows.iter().map(participant_from_row).collect())
    }
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn commit(&self, commit: LedgerCommit) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        advance_in(&mut *tx, commit.position).await?;

        sqlx::query(
            "UPDATE system_checkpoint
             SET total_shares = ?, last_update = ?, points_per_share = ?
             WHERE id = 1",
        )
        .bind(commit.pool.total_shares)
        .bind(commit.pool.last_update)
        .bind(commit.pool.points_per_share)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        if let Some(p) = &commit.participant {
            sqlx::query(
                "INSERT INTO participants (address, points, shares, points_per_share_paid)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(address) DO UPDATE SET
                    points = excluded.points,
                    shares = excluded.shares,
                    points_per_share_paid = excluded.points_per_share_paid",
            )
            .bind(&p.address)
            .bind(p.points)
            .bind(p.shares)
            .bind(p.points_per_share_paid)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(position = %commit.position, "ledger commit");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(total_shares: f64, last_update: i64, points_per_share: f64) -> PoolState {
        PoolState {
            total_shares,
            last_update,
            points_per_share,
        }
    }

    fn holder(address: &str, points: f64, shares: f64, paid: f64) -> Participant {
        Participant {
            address: address.into(),
            points,
            shares,
            points_per_share_paid: paid,
        }
    }

    // ── CheckpointStore ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn init_creates_once() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        assert!(store.load().await.unwrap().is_none());

        let cp = store.init(18_000_000).await.unwrap();
        assert_eq!(cp.position, LogPosition::start_of(18_000_000));
        assert_eq!(cp.pool, PoolState::default());

        store.advance(LogPosition::end_of(18_000_010)).await.unwrap();
        // second init keeps the existing row
        let again = store.init(0).await.unwrap();
        assert_eq!(again.position, LogPosition::end_of(18_000_010));
    }

    #[tokio::test]
    async fn advance_never_moves_back() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        store.init(100).await.unwrap();

        store.advance(LogPosition::after_log(105, 3)).await.unwrap();
        store.advance(LogPosition::end_of(104)).await.unwrap();
        store.advance(LogPosition::after_log(105, 2)).await.unwrap();

        let cp = store.load().await.unwrap().unwrap();
        assert_eq!(cp.position, LogPosition::after_log(105, 3));
        assert_eq!(cp.last_block_indexed(), 105);
    }

    #[tokio::test]
    async fn advance_without_checkpoint_fails() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        let err = store.advance(LogPosition::end_of(1)).await.unwrap_err();
        assert!(matches!(err, IndexerError::Storage(_)));
    }

    // ── LedgerStore ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn commit_writes_all_three_parts() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        store.init(0).await.unwrap();

        store
            .commit(LedgerCommit {
                participant: Some(holder("0xA", 0.0, 100.0, 0.0)),
                pool: pool(100.0, 1_000, 0.0),
                position: LogPosition::after_log(5, 0),
            })
            .await
            .unwrap();
        store
            .commit(LedgerCommit {
                participant: Some(holder("0xA", 1_000.0, 40.0, 10.0)),
                pool: pool(40.0, 1_010, 10.0),
                position: LogPosition::after_log(6, 2),
            })
            .await
            .unwrap();

        let cp = store.load().await.unwrap().unwrap();
        assert_eq!(cp.position, LogPosition::after_log(6, 2));
        assert_eq!(cp.pool, pool(40.0, 1_010, 10.0));

        let a = store.participant("0xA").await.unwrap().unwrap();
        assert_eq!(a, holder("0xA", 1_000.0, 40.0, 10.0));
        assert_eq!(store.participants().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_commit_writes_nothing() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();

        // no checkpoint row: the transaction aborts before the upsert
        let err = store
            .commit(LedgerCommit {
                participant: Some(holder("0xA", 0.0, 1.0, 0.0)),
                pool: pool(1.0, 0, 0.0),
                position: LogPosition::after_log(1, 0),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Storage(_)));
        assert!(store.participant("0xA").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_without_participant_updates_pool_only() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        store.init(0).await.unwrap();

        store
            .commit(LedgerCommit {
                participant: None,
                pool: pool(0.0, 50, 0.0),
                position: LogPosition::after_log(2, 1),
            })
            .await
            .unwrap();

        let cp = store.load().await.unwrap().unwrap();
        assert_eq!(cp.pool.last_update, 50);
        assert!(store.participants().await.unwrap().is_empty());
    }

    // ── Leaderboard ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn top_uses_current_index_and_first_appearance_ties() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        store.init(0).await.unwrap();

        let rows = [
            holder("0xTie1", 10.0, 0.0, 0.0),
            holder("0xGrowing", 0.0, 5.0, 0.0),
            holder("0xTie2", 10.0, 0.0, 0.0),
        ];
        for (i, p) in rows.into_iter().enumerate() {
            store
                .commit(LedgerCommit {
                    participant: Some(p),
                    pool: pool(5.0, i as i64, 4.0),
                    position: LogPosition::after_log(1, i as u32),
                })
                .await
                .unwrap();
        }

        // 0xGrowing: 5 shares * (4 - 0) = 20 unsettled points
        let top = store.top(10).await.unwrap();
        let order: Vec<_> = top.iter().map(|e| e.address.as_str()).collect();
        assert_eq!(order, ["0xGrowing", "0xTie1", "0xTie2"]);
        assert_eq!(top[0].points, 20.0);

        assert_eq!(store.top(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let path = std::env::temp_dir().join(format!(
            "chainpoints-reopen-{}-{}.db",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let path = path.to_string_lossy().to_string();

        {
            let store = SqliteLedgerStore::open(&path).await.unwrap();
            store.init(7).await.unwrap();
            store
                .commit(LedgerCommit {
                    participant: Some(holder("0xA", 3.0, 2.0, 1.0)),
                    pool: pool(2.0, 99, 1.0),
                    position: LogPosition::end_of(9),
                })
                .await
                .unwrap();
            store.pool.close().await;
        }

        let store = SqliteLedgerStore::open(&path).await.unwrap();
        let cp = store.load().await.unwrap().unwrap();
        assert_eq!(cp.position, LogPosition::end_of(9));
        assert_eq!(cp.pool, pool(2.0, 99, 1.0));
        assert_eq!(
            store.participant("0xA").await.unwrap().unwrap(),
            holder("0xA", 3.0, 2.0, 1.0)
        );

        store.pool.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
