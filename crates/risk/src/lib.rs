//! # Risk Crate
//!
//! Pre-trade validation and protective exits.
//!
//! - `OrderGuard` decides whether an order may be filled given the account state
//!   and the configured limits. A refusal is a `TradeRejection`, which the
//!   coordinator records on a failed order.
//! - `ExitRules` turns open positions that breached their stop-loss or
//!   take-profit threshold into sell proposals.

pub mod error;
pub mod exit_rules;
pub mod guard;

pub use error::{RiskError, TradeRejection};
pub use exit_rules::{ExitKind, ExitRules};
pub use guard::OrderGuard;
