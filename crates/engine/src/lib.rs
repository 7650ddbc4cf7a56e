//! # Engine Crate
//!
//! The orchestration layer of the desk. It wires the ledger, the accounting
//! book, the risk guard and the external collaborators into the operations the
//! outside world calls.
//!
//! ## Architectural Principles
//!
//! - **One writer per order:** `OrderCoordinator` loads the account, validates,
//!   fills and persists each proposal inside a single ledger transaction. The
//!   order row, the position change and the cash update commit together or not
//!   at all.
//! - **Degrade, don't abort:** collaborator calls are bounded by timeouts. A
//!   missing index, candidate indicator or quote degrades that one data point;
//!   only a failed decision call ends a cycle early.
//! - **Time is injected:** everything that asks "what day is it" goes through
//!   `ExchangeClock`, so settlement, daily limits and scheduling are testable.
//!
//! ## Public API
//!
//! - `TradingDesk`: coordination cycles, manual analysis, reprice, close summary,
//!   queries and reset for one portfolio.
//! - `OrderCoordinator`: validated, atomic execution of a single proposal.
//! - `SessionScheduler` / `SessionCalendar`: the trading-session timetable.
//! - `Clock`, `SystemClock`, `FixedClock`, `ExchangeClock`: time sources.

pub mod clock;
pub mod coordinator;
pub mod desk;
pub mod error;
pub mod market;
pub mod scheduler;

pub use clock::{Clock, ExchangeClock, FixedClock, SystemClock};
pub use coordinator::OrderCoordinator;
pub use desk::{AnalysisOutcome, CycleReport, TradingDesk};
pub use error::EngineError;
pub use market::MarketIntel;
pub use scheduler::{Job, SchedulerStatus, SessionCalendar, SessionScheduler};
