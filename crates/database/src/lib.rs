//! # Database Crate
//!
//! The ledger store: durable state for portfolios, positions, orders, P&L
//! records and analysis runs, kept in SQLite.
//!
//! ## Architectural Principles
//!
//! - **Layer 3 Adapter:** All SQL lives here. The rest of the workspace sees
//!   domain types from `core-types` only.
//! - **Single writer:** Every mutation runs inside a `LedgerTx`, which holds the
//!   repository-wide writer lock. An order's cash, position and order-row changes
//!   commit together or not at all.
//! - **Exact money:** Decimals are stored as TEXT so no value passes through a float.
//!
//! ## Public API
//!
//! - `connect`, `run_migrations`: open the pool and apply the embedded schema.
//! - `LedgerRepository`: reads and write-transaction entry point.
//! - `LedgerTx`: the write transaction.
//! - `DbError`: the specific error types that can be returned from this crate.

pub mod connection;
pub mod error;
pub mod repository;

pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use repository::{LedgerRepository, LedgerTx};
