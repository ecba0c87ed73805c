//! chainpoints-storage: durable [`LedgerStore`](chainpoints_core::LedgerStore) backends.
//!
//! Backends:
//! - [`sqlite`]: SQLite via `sqlx` (single file, or in-memory for tests)
//! - [`postgres`]: PostgreSQL via `sqlx`
//!
//! Both keep the same two tables: a singleton checkpoint row (position and
//! pool aggregate) and one row per participant. Every ledger commit is one
//! database transaction.

#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod position;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedgerStore;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresLedgerStore, PostgresOptions};
