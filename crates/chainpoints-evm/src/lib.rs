//! chainpoints-evm: discovers the tracked contract's logs and feeds them,
//! in chain order, through the points ledger.
//!
//! ```text
//! IndexLoop
//!   ├── EvmFetcher<ManagedRpcClient>  (bounded retry, re-acquires per attempt)
//!   ├── EventDecoder                  (Borrow / Repay / Liquidate)
//!   ├── LogPoller ── mpsc ──▶ consumer (live phase)
//!   └── PointsLedger                  (chainpoints-core)
//! ```

pub mod builder;
pub mod client;
pub mod decoder;
pub mod fetcher;
pub mod index_loop;
pub mod live;

pub use builder::IndexerBuilder;
pub use client::ManagedRpcClient;
pub use decoder::{DecodeError, EventDecoder};
pub use fetcher::{BlockHeader, EvmFetcher, EvmRpcClient, LogFilter, RawLog};
pub use index_loop::IndexLoop;
pub use live::{LiveItem, LogPoller};
