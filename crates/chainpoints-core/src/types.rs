//! Decoded ledger events.

use serde::{Deserialize, Serialize};

/// A tracked contract event, reduced to what the ledger needs.
///
/// Produced by the decoder, consumed immediately by [`PointsLedger`](crate::ledger::PointsLedger),
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Shares added to `address` (a `Borrow` on the contract).
    Deposit { address: String, shares: f64 },
    /// Shares removed from `address` (a `Repay`).
    Withdraw { address: String, shares: f64 },
    /// Shares seized from `address`, plus bad debt written off the pool
    /// without attribution (a `Liquidate`).
    Seize {
        address: String,
        repaid_shares: f64,
        bad_debt_shares: f64,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "deposit",
            Self::Withdraw { .. } => "withdraw",
            Self::Seize { .. } => "seize",
        }
    }

    /// The participant the event is attributed to.
    pub fn address(&self) -> &str {
        match self {
            Self::Deposit { address, .. }
            | Self::Withdraw { address, .. }
            | Self::Seize { address, .. } => address,
        }
    }
}
