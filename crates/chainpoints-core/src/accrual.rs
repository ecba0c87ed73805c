//! Time-weighted accrual using a reward-per-share index.
//!
//! Every elapsed second the pool emits `RATE_PER_SECOND` points, split across
//! holders in proportion to their shares. Instead of crediting each
//! participant on every event, the pool keeps a running `points_per_share`
//! total and participants are credited lazily when they are next mutated:
//!
//! ```text
//! points_per_share += rate * dt / total_shares
//! earned(p)         = p.shares * (points_per_share - p.points_per_share_paid)
//! ```

use serde::{Deserialize, Serialize};

use crate::participant::Participant;
use crate::types::LedgerEvent;

/// Points emitted by the pool per elapsed second.
pub const RATE_PER_SECOND: f64 = 100.0;

/// Pool-wide aggregate persisted on the checkpoint row.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoolState {
    pub total_shares: f64,
    /// Unix seconds of the last accrual.
    pub last_update: i64,
    pub points_per_share: f64,
}

impl PoolState {
    /// Accrual-for-all up to `timestamp`.
    pub fn accrue(&mut self, timestamp: i64, rate_per_second: f64) {
        let dt = timestamp - self.last_update;
        if dt <= 0 {
            return;
        }
        if self.total_shares > 0.0 {
            self.points_per_share += rate_per_second * dt as f64 / self.total_shares;
        }
        self.last_update = timestamp;
    }

    fn remove_shares(&mut self, shares: f64) {
        self.total_shares = (self.total_shares - shares).max(0.0);
    }
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// The updated participant row, if one is attributed.
    pub participant: Option<Participant>,
    /// A withdraw or seize named an address that never deposited.
    pub unknown_participant: bool,
}

/// Apply `event` at `timestamp`: accrue for everyone, then move shares.
///
/// `existing` is the stored row for `event.address()`, if any.
pub fn apply_event(
    pool: &mut PoolState,
    existing: Option<Participant>,
    event: &LedgerEvent,
    timestamp: i64,
    rate_per_second: f64,
) -> Applied {
    pool.accrue(timestamp, rate_per_second);
    let pps = pool.points_per_share;

    match event {
        LedgerEvent::Deposit { address, shares } => {
            let mut p = existing.unwrap_or_else(|| Participant::new(address.clone(), pps));
            p.settle(pps);
            p.shares += shares;
            pool.total_shares += shares;
            Applied {
                participant: Some(p),
                unknown_participant: false,
            }
        }
        LedgerEvent::Withdraw { shares, .. } => {
            pool.remove_shares(*shares);
            reduce(existing, *shares, pps)
        }
        LedgerEvent::Seize {
            repaid_shares,
            bad_debt_shares,
            ..
        } => {
            pool.remove_shares(repaid_shares + bad_debt_shares);
            reduce(existing, *repaid_shares, pps)
        }
    }
}

fn reduce(existing: Option<Participant>, shares: f64, pps: f64) -> Applied {
    match existing {
        Some(mut p) => {
            p.settle(pps);
            p.shares = (p.shares - shares).max(0.0);
            Applied {
                participant: Some(p),
                unknown_participant: false,
            }
        }
        None => Applied {
            participant: None,
            unknown_participant: true,
        },
    }
}

#[cfg(test)]
pub(crate) mod reference {
    //! Straightforward O(participants) accrual, kept as the model the
    //! accumulator is checked against.

    use crate::types::LedgerEvent;

    #[derive(Debug, Default)]
    pub struct NaiveLedger {
        pub total_shares: f64,
        pub last_update: i64,
        /// `(address, points, shares)` in first-appearance order.
        pub rows: Vec<(String, f64, f64)>,
    }

    impl NaiveLedger {
        fn accrue(&mut self, timestamp: i64, rate: f64) {
            let dt = timestamp - self.last_update;
            if dt <= 0 {
                return;
            }
            if self.total_shares > 0.0 {
                let pool = rate * dt as f64;
                for row in &mut self.rows {
                    row.1 += pool * (row.2 / self.total_shares);
                }
            }
            self.last_update = timestamp;
        }

        fn row(&mut self, address: &str) -> Option<&mut (String, f64, f64)> {
            self.rows.iter_mut().find(|r| r.0 == address)
        }

        pub fn apply(&mut self, event: &LedgerEvent, timestamp: i64, rate: f64) {
            self.accrue(timestamp, rate);
            match event {
                LedgerEvent::Deposit { address, shares } => {
                    match self.row(address) {
                        Some(r) => r.2 += shares,
                        None => self.rows.push((address.clone(), 0.0, *shares)),
                    }
                    self.total_shares += shares;
                }
                LedgerEvent::Withdraw { address, shares } => {
                    if let Some(r) = self.row(address) {
                        r.2 = (r.2 - shares).max(0.0);
                    }
                    self.total_shares = (self.total_shares - shares).max(0.0);
                }
                LedgerEvent::Seize {
                    address,
                    repaid_shares,
                    bad_debt_shares,
                } => {
                    if let Some(r) = self.row(address) {
                        r.2 = (r.2 - repaid_shares).max(0.0);
                    }
                    self.total_shares =
                        (self.total_shares - (repaid_shares + bad_debt_shares)).max(0.0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::reference::NaiveLedger;
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn deposit(a: &str, s: f64) -> LedgerEvent {
        LedgerEvent::Deposit { address: a.into(), shares: s }
    }

    fn withdraw(a: &str, s: f64) -> LedgerEvent {
        LedgerEvent::Withdraw { address: a.into(), shares: s }
    }

    /// Accumulator over a plain map, mirroring what the ledger does with a store.
    #[derive(Default)]
    struct IndexModel {
        pool: PoolState,
        rows: HashMap<String, Participant>,
        order: Vec<String>,
    }

    impl IndexModel {
        fn apply(&mut self, event: &LedgerEvent, ts: i64) -> Applied {
            let existing = self.rows.get(event.address()).cloned();
            let applied = apply_event(&mut self.pool, existing, event, ts, RATE_PER_SECOND);
            if let Some(p) = &applied.participant {
                if !self.rows.contains_key(&p.address) {
                    self.order.push(p.address.clone());
                }
                self.rows.insert(p.address.clone(), p.clone());
            }
            applied
        }

        fn points(&self, address: &str) -> f64 {
            self.rows[address].points_at(self.pool.points_per_share)
        }
    }

    #[test]
    fn zero_pool_only_moves_the_clock() {
        let mut pool = PoolState::default();
        pool.accrue(50, RATE_PER_SECOND);
        assert_eq!(pool.last_update, 50);
        assert_eq!(pool.points_per_share, 0.0);
    }

    #[test]
    fn non_increasing_timestamp_is_a_no_op() {
        let mut pool = PoolState {
            total_shares: 10.0,
            last_update: 100,
            points_per_share: 1.0,
        };
        pool.accrue(100, RATE_PER_SECOND);
        pool.accrue(90, RATE_PER_SECOND);
        assert_eq!(pool.last_update, 100);
        assert_eq!(pool.points_per_share, 1.0);
    }

    #[test]
    fn two_participant_scenario() {
        let mut m = IndexModel::default();
        m.apply(&deposit("A", 100.0), 0);
        assert_eq!(m.pool.last_update, 0);

        m.apply(&deposit("B", 300.0), 10);
        assert!((m.points("A") - 1000.0).abs() < 1e-9);
        assert_eq!(m.pool.total_shares, 400.0);

        m.apply(&withdraw("A", 50.0), 20);
        assert!((m.points("A") - 1250.0).abs() < 1e-9);
        assert!((m.points("B") - 750.0).abs() < 1e-9);
        assert_eq!(m.rows["A"].shares, 50.0);
        assert_eq!(m.pool.total_shares, 350.0);
    }

    #[test]
    fn late_joiner_earns_nothing_for_the_past() {
        let mut m = IndexModel::default();
        m.apply(&deposit("A", 10.0), 0);
        m.apply(&deposit("B", 10.0), 100);
        assert_eq!(m.points("B"), 0.0);
    }

    #[test]
    fn unknown_withdraw_still_shrinks_pool_and_moves_clock() {
        let mut m = IndexModel::default();
        m.apply(&deposit("A", 10.0), 0);
        let applied = m.apply(&withdraw("ghost", 4.0), 5);
        assert!(applied.unknown_participant);
        assert!(applied.participant.is_none());
        assert_eq!(m.pool.total_shares, 6.0);
        assert_eq!(m.pool.last_update, 5);
    }

    #[test]
    fn seize_removes_bad_debt_from_pool() {
        let mut m = IndexModel::default();
        m.apply(&deposit("A", 100.0), 0);
        m.apply(&deposit("B", 100.0), 0);
        m.apply(
            &LedgerEvent::Seize {
                address: "A".into(),
                repaid_shares: 30.0,
                bad_debt_shares: 20.0,
            },
            1,
        );
        assert_eq!(m.rows["A"].shares, 70.0);
        assert_eq!(m.pool.total_shares, 150.0);
    }

    #[test]
    fn reductions_floor_at_zero() {
        let mut m = IndexModel::default();
        m.apply(&deposit("A", 5.0), 0);
        m.apply(&withdraw("A", 8.0), 1);
        assert_eq!(m.rows["A"].shares, 0.0);
        assert_eq!(m.pool.total_shares, 0.0);
    }

    fn event_strategy() -> impl Strategy<Value = (u8, usize, f64, f64)> {
        // (kind, participant, amount, bad debt)
        (0u8..3, 0usize..5, 1.0f64..1_000.0, 0.0f64..50.0)
    }

    proptest! {
        #[test]
        fn accumulator_matches_naive_scan(
            steps in proptest::collection::vec((event_strategy(), 0i64..500), 1..60)
        ) {
            let names = ["A", "B", "C", "D", "E"];
            let mut naive = NaiveLedger::default();
            let mut index = IndexModel::default();
            let mut ts = 0i64;

            for ((kind, who, amount, bad), dt) in steps {
                // dt may be 0, exercising the no-op guard
                ts += dt;
                let address = names[who].to_string();
                let event = match kind {
                    0 => LedgerEvent::Deposit { address, shares: amount },
                    1 => LedgerEvent::Withdraw { address, shares: amount },
                    _ => LedgerEvent::Seize { address, repaid_shares: amount, bad_debt_shares: bad },
                };
                naive.apply(&event, ts, RATE_PER_SECOND);
                index.apply(&event, ts);
            }

            prop_assert_eq!(naive.last_update, index.pool.last_update);
            prop_assert!((naive.total_shares - index.pool.total_shares).abs() < 1e-6);
            let order: Vec<&str> = naive.rows.iter().map(|r| r.0.as_str()).collect();
            let index_order: Vec<&str> = index.order.iter().map(String::as_str).collect();
            prop_assert_eq!(order, index_order);

            for (address, points, shares) in &naive.rows {
                let got = index.points(address);
                let tolerance = 1e-6 * points.abs().max(1.0);
                prop_assert!((got - points).abs() <= tolerance, "{address}: {got} vs {points}");
                prop_assert!((index.rows[address].shares - shares).abs() < 1e-6);
            }
        }
    }
}
