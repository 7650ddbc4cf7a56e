//! # Core Types
//!
//! The shared vocabulary of the trading desk: closed enums for trade actions and
//! order lifecycle, the ledger entities (`Portfolio`, `Position`, `Order`,
//! `PnLRecord`, `AnalysisRun`) and the data exchanged with the market-data and
//! decision collaborators.
//!
//! This crate has no knowledge of storage or scheduling; every other crate in the
//! workspace depends on it.

pub mod enums;
pub mod error;
pub mod market;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{OrderSide, OrderStatus, Sentiment, TradeAction, TriggerKind};
pub use error::CoreError;
pub use market::{
    AnalysisResult, Bar, Candidate, Decision, IndexSnapshot, Indicators, MarketContext, Quote,
};
pub use structs::{
    AnalysisRun, Order, OrderRequest, PnLRecord, Portfolio, PortfolioSnapshot, Position,
    PositionView, TradeProposal, LOT_SIZE,
};
