//! Participant rows and the read side of the ledger.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// One row per on-chain address that has ever gained shares.
///
/// `points` is settled up to `points_per_share_paid`; points earned since
/// then are derived from the pool index on read (see [`Participant::points_at`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// EIP-55 checksummed address.
    pub address: String,
    pub points: f64,
    pub shares: f64,
    /// Pool `points_per_share` at this participant's last settlement.
    pub points_per_share_paid: f64,
}

impl Participant {
    /// A participant joining when the pool index stands at `points_per_share`.
    pub fn new(address: impl Into<String>, points_per_share: f64) -> Self {
        Self {
            address: address.into(),
            points: 0.0,
            shares: 0.0,
            points_per_share_paid: points_per_share,
        }
    }

    /// Points including everything earned up to the pool index `points_per_share`.
    pub fn points_at(&self, points_per_share: f64) -> f64 {
        self.points + self.shares * (points_per_share - self.points_per_share_paid)
    }

    /// Fold earned points into `points` and move the snapshot to `points_per_share`.
    pub fn settle(&mut self, points_per_share: f64) {
        self.points = self.points_at(points_per_share);
        self.points_per_share_paid = points_per_share;
    }
}

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub address: String,
    pub points: f64,
}

/// Read access to participant rows.
#[async_trait]
pub trait ParticipantStore: Send + Sync {
    /// Look up a participant by checksummed address.
    async fn participant(&self, address: &str) -> Result<Option<Participant>, IndexerError>;

    /// Participants ordered by points (as of the last accrual) descending,
    /// ties broken by first appearance.
    async fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, IndexerError>;

    /// Every participant in first-appearance order.
    async fn participants(&self) -> Result<Vec<Participant>, IndexerError>;
}
