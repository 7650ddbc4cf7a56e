//! # Desk Events
//!
//! The messages the trading desk publishes on its broadcast channel. A transport
//! layer (WebSocket, log shipper, CLI watcher) subscribes and forwards them.
//!
//! As a Layer 0 crate, it depends only on `core-types`.

pub mod error;
pub mod messages;

pub use error::EventsError;
pub use messages::{AnalysisSummary, DeskEvent, LogLevel, LogMessage};
