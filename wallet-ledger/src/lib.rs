//! Wallet Ledger
//!
//! In-memory wallet ledger with asynchronous write-back to a durable store.
//!
//! # Architecture
//!
//! - **Ledger Store**: One lock serializes every account operation
//! - **Stat Aggregator**: Running per-account totals, updated under the ledger lock
//! - **Write-Back**: A background task drains dirty markers into a document store
//! - **Fail-Fast**: A persistence failure stops the synchronizer and the process
//!
//! # Invariants
//!
//! - Balance == initial + Σ(deposits) + Σ(wins) − Σ(bets)
//! - A bet never drives a balance below zero
//! - Deposit and transaction IDs are unique per account
//! - Rejected operations leave all state unchanged

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    clippy::all
)]

pub mod types;
pub mod error;
pub mod config;
pub mod stats;
pub mod ledger;
pub mod gateway;
pub mod storage;
pub mod sync;
pub mod metrics;
pub mod api;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    AccountId, AccountSnapshot, Deposit, DepositId, Stat, Transaction, TransactionId,
    TransactionKind,
};
pub use config::Config;
pub use ledger::LedgerStore;
pub use stats::StatAggregator;
pub use gateway::{Collection, MemoryGateway, PersistenceGateway};
pub use storage::RocksGateway;
pub use sync::{spawn_synchronizer, SyncHandle, SyncReport, WriteBackSynchronizer};
pub use metrics::Metrics;
