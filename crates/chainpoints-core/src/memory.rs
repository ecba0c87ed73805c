//! In-memory ledger store for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::checkpoint::{CheckpointStore, LedgerCommit, LedgerStore, SystemCheckpoint};
use crate::error::IndexerError;
use crate::participant::{LeaderboardEntry, Participant, ParticipantStore};
use crate::position::LogPosition;

#[derive(Default)]
struct State {
    checkpoint: Option<SystemCheckpoint>,
    /// First-appearance order.
    participants: Vec<Participant>,
    by_address: HashMap<String, usize>,
}

/// `LedgerStore` held behind a mutex. Nothing survives the process, but one
/// instance can be shared across several pipeline runs to simulate restarts.
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<State>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn advance_in(state: &mut State, position: LogPosition) -> Result<(), IndexerError> {
    let cp = state
        .checkpoint
        .as_mut()
        .ok_or_else(|| IndexerError::Storage("checkpoint not initialised".into()))?;
    if position > cp.position {
        cp.position = position;
    }
    cp.updated_at = chrono::Utc::now().timestamp();
    Ok(())
}

#[async_trait]
impl CheckpointStore for MemoryLedgerStore {
    async fn load(&self) -> Result<Option<SystemCheckpoint>, IndexerError> {
        Ok(self.lock().checkpoint.clone())
    }

    async fn init(&self, start_block: u64) -> Result<SystemCheckpoint, IndexerError> {
        let mut state = self.lock();
        Ok(state
            .checkpoint
            .get_or_insert_with(|| SystemCheckpoint::genesis(start_block))
            .clone())
    }

    async fn advance(&self, position: LogPosition) -> Result<(), IndexerError> {
        advance_in(&mut self.lock(), position)
    }
}

#[async_trait]
impl ParticipantStore for MemoryLedgerStore {
    async fn participant(&self, address: &str) -> Result<Option<Participant>, IndexerError> {
        let state = self.lock();
        Ok(state
            .by_address
            .get(address)
            .map(|&i| state.participants[i].clone()))
    }

    async fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, IndexerError> {
        let state = self.lock();
        let pps = state
            .checkpoint
            .as_ref()
            .map(|cp| cp.pool.points_per_share)
            .unwrap_or_default();

        let mut entries: Vec<LeaderboardEntry> = state
            .participants
            .iter()
            .map(|p| LeaderboardEntry {
                address: p.address.clone(),
                points: p.points_at(pps),
            })
            .collect();
        // stable: equal points keep first-appearance order
        entries.sort_by(|a, b| b.points.total_cmp(&a.points));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn participants(&self) -> Result<Vec<Participant>, IndexerError> {
        Ok(self.lock().participants.clone())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn commit(&self, commit: LedgerCommit) -> Result<(), IndexerError> {
        let mut state = self.lock();
        advance_in(&mut state, commit.position)?;
        if let Some(cp) = state.checkpoint.as_mut() {
            cp.pool = commit.pool;
        }

        if let Some(p) = commit.participant {
            match state.by_address.get(&p.address).copied() {
                Some(i) => state.participants[i] = p,
                None => {
                    let i = state.participants.len();
                    state.by_address.insert(p.address.clone(), i);
                    state.participants.push(p);
                }
            }
        }
        Ok(())
    }
}
