//! Points ledger: applies decoded events to the pool and participants.
//!
//! Each handler runs accrual-for-all, moves shares, and persists the result
//! together with the triggering log position in one [`LedgerCommit`]. The
//! in-memory pool copy only changes after the commit succeeds, so a failed
//! write leaves the ledger exactly as durable storage has it.

use std::sync::Arc;

use tracing::{debug, error};

use crate::accrual::{apply_event, PoolState, RATE_PER_SECOND};
use crate::checkpoint::{LedgerCommit, LedgerStore, SystemCheckpoint};
use crate::error::IndexerError;
use crate::participant::{LeaderboardEntry, ParticipantStore};
use crate::position::LogPosition;
use crate::types::LedgerEvent;

/// Leaderboard size when the caller gives no limit.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

/// The single writer of pool and participant state.
pub struct PointsLedger {
    store: Arc<dyn LedgerStore>,
    pool: PoolState,
}

impl PointsLedger {
    /// Resume from the stored checkpoint's pool aggregate.
    pub fn new(store: Arc<dyn LedgerStore>, checkpoint: &SystemCheckpoint) -> Self {
        Self {
            store,
            pool: checkpoint.pool,
        }
    }

    pub fn pool(&self) -> PoolState {
        self.pool
    }

    /// Dispatch `event` to its handler.
    pub async fn apply(
        &mut self,
        event: &LedgerEvent,
        timestamp: i64,
        position: LogPosition,
    ) -> Result<(), IndexerError> {
        let existing = self.store.participant(event.address()).await?;
        let mut pool = self.pool;
        let applied = apply_event(&mut pool, existing, event, timestamp, RATE_PER_SECOND);

        if applied.unknown_participant {
            error!(
                kind = event.kind(),
                address = %event.address(),
                %position,
                "ledger consistency violation: unknown participant; adjusting pool only"
            );
        }

        self.store
            .commit(LedgerCommit {
                participant: applied.participant,
                pool,
                position,
            })
            .await?;
        self.pool = pool;

        debug!(
            kind = event.kind(),
            address = %event.address(),
            timestamp,
            total_shares = pool.total_shares,
            "ledger event applied"
        );
        Ok(())
    }

    pub async fn deposit(
        &mut self,
        address: &str,
        shares: f64,
        timestamp: i64,
        position: LogPosition,
    ) -> Result<(), IndexerError> {
        let event = LedgerEvent::Deposit {
            address: address.to_string(),
            shares,
        };
        self.apply(&event, timestamp, position).await
    }

    pub async fn withdraw(
        &mut self,
        address: &str,
        shares: f64,
        timestamp: i64,
        position: LogPosition,
    ) -> Result<(), IndexerError> {
        let event = LedgerEvent::Withdraw {
            address: address.to_string(),
            shares,
        };
        self.apply(&event, timestamp, position).await
    }

    pub async fn seize(
        &mut self,
        address: &str,
        repaid_shares: f64,
        bad_debt_shares: f64,
        timestamp: i64,
        position: LogPosition,
    ) -> Result<(), IndexerError> {
        let event = LedgerEvent::Seize {
            address: address.to_string(),
            repaid_shares,
            bad_debt_shares,
        };
        self.apply(&event, timestamp, position).await
    }

    pub async fn top_participants(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<LeaderboardEntry>, IndexerError> {
        top_participants(self.store.as_ref(), limit).await
    }
}

/// Leaderboard as of the last accrual. Points earned since the last event
/// are not included; callers wanting "now" must apply an event first.
pub async fn top_participants<S>(
    store: &S,
    limit: Option<usize>,
) -> Result<Vec<LeaderboardEntry>, IndexerError>
where
    S: ParticipantStore + ?Sized,
{
    store.top(limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT)).await
}
