//! # Executor Crate
//!
//! The accounting engine of the desk: fee calculation, simulated fills and the
//! in-memory account state machine that turns fills into cash and position
//! changes.
//!
//! ## Architectural Principles
//!
//! - **State vs. Logic Decoupling:** The `Executor` trait computes the effect of a
//!   trade (price and fees) without touching state. The `Book` applies a fill to
//!   cash and positions. Neither touches storage; the engine persists the result.
//! - **Execution Abstraction:** The coordinator only sees `Executor`, so a venue
//!   with slippage or partial fills can be swapped in without changing it.
//!
//! ## Public API
//!
//! - `Executor` / `SimulatedExecutor`: fill computation.
//! - `Book`: cash and positions of one portfolio, mutated by `apply` and `reprice`.
//! - `calculate_fees`, `buy_debit`: the flat fee model.
//! - `derive_pnl_record`, `build_snapshot`: performance figures.

pub mod book;
pub mod error;
pub mod exchange;
pub mod fees;
pub mod pnl;

pub use book::{AppliedFill, Book, PositionChange};
pub use error::ExecutorError;
pub use exchange::{Execution, Executor, SimulatedExecutor};
pub use fees::{FeeBreakdown, buy_debit, calculate_fees};
pub use pnl::{build_snapshot, derive_pnl_record, ratio};
